mod cli;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .init();

    let args: Vec<String> = std::env::args().collect();

    // --offline <out.wav> renders without opening the sound card
    if args.len() > 2 && args[1] == "--offline" {
        return cli::render_offline(&args[2]);
    }

    let music_path = args.get(1).map(String::as_str);
    cli::run_device_demo(music_path)
}
