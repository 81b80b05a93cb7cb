#![no_main]
use libfuzzer_sys::fuzz_target;
use verdelta::delta::apply;
use verdelta::wire::{Frame, WireLayout, from_wire};

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic, only return errors.
    for layout in [WireLayout::Dense, WireLayout::Hashed, WireLayout::Sparse] {
        if let Ok(delta) = from_wire(data, layout) {
            // Anything the decoder accepts must be safe to apply.
            let _ = apply(Some(data), &delta);
            let _ = apply(None, &delta);
        }
    }
    if let Ok(Frame::Delta(delta)) = Frame::from_bytes(data) {
        let _ = apply(Some(data), &delta);
    }
});
