fn main() {
    #[cfg(feature = "cli")]
    verdelta::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("verdelta: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
