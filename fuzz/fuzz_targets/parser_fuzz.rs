#![no_main]
use libfuzzer_sys::fuzz_target;

const COMMANDS: [&str; 7] = ["init", "commit", "apply", "diff", "patch", "inspect", "config"];

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };

    // Steer half the inputs at a real subcommand so flag parsing gets covered.
    let mut args = Vec::<String>::new();
    if selector & 1 == 0 {
        args.push(COMMANDS[(selector as usize >> 1) % COMMANDS.len()].to_string());
    }
    let text = String::from_utf8_lossy(rest);
    args.extend(text.split_whitespace().take(32).map(str::to_string));
    verdelta::cli::fuzz_try_parse_args(&args);
});
