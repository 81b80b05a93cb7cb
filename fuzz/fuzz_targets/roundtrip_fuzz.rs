#![no_main]
use libfuzzer_sys::fuzz_target;
use verdelta::snapshot::Snapshot;
use verdelta::wire::Frame;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let split = 1 + (data[0] as usize % (data.len() - 1));
    let old = &data[1..split];
    let new = &data[split..];

    let mut writer = Snapshot::new(Some(old.to_vec()));
    let mut reader = writer.clone();
    let delta = writer.change_data(new);

    let bytes = Frame::Delta(delta).to_bytes().unwrap();
    let Frame::Delta(received) = Frame::from_bytes(&bytes).unwrap() else {
        panic!("delta frame decoded as snapshot");
    };
    reader.increment_data(&received, false).unwrap();
    assert_eq!(reader.data(), Some(new));
});
