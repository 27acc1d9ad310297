mod platform;

use anyhow::Result;
use clap::Parser;
use grid_game::GameState;
use grid_input::InputState;
use grid_render::GridRenderer;
use grid_render_wgpu::WgpuDevice;
use platform::Platform;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const WINDOW_WIDTH: u32 = 1920;
const WINDOW_HEIGHT: u32 = 1080;
const WINDOW_TITLE: &str = "Grid Example";

#[derive(Parser)]
#[command(name = "grid-desktop", about = "Checkerboard grid viewer with shader hot-reload")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding the solid-color WGSL shaders
    #[arg(long, default_value = "res/shaders")]
    res_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("grid-desktop starting");

    let mut platform = match Platform::init(WINDOW_WIDTH, WINDOW_HEIGHT, WINDOW_TITLE) {
        Ok(platform) => platform,
        Err(e) => {
            tracing::error!("{e}");
            return Ok(());
        }
    };

    let size = platform.window().inner_size();
    let mut device = match WgpuDevice::new(platform.window(), size.width, size.height) {
        Ok(device) => device,
        Err(e) => {
            tracing::error!("{e}");
            platform.shutdown();
            return Ok(());
        }
    };

    let mut input = InputState::new();
    let mut game = GameState::new();
    let mut renderer = GridRenderer::new(cli.res_dir);
    renderer.init(&mut device);

    while platform.window_is_open() {
        input.update(&platform);
        game.update(&input, &mut platform);
        renderer.render_frame(&mut device, game.view_matrix(), &input);
        platform.swap_buffers_poll_events(&mut device);
    }

    drop(renderer);
    drop(device);
    platform.shutdown();
    Ok(())
}
