use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use grid_render::{ShaderStage, compile, link};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for the grid viewer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all checks: fmt, clippy, shaders, tests, doc
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates
    Clippy,
    /// Validate every WGSL file under res/ and link the shipped pair
    Shaders,
    /// Run all tests
    Test,
    /// Build rustdoc for the workspace
    Doc,
    /// Build the entire workspace
    Build,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            run_fmt()?;
            run_clippy()?;
            run_shaders()?;
            run_tests()?;
            run_doc()?;
        }
        Commands::Fmt => run_fmt()?,
        Commands::Clippy => run_clippy()?,
        Commands::Shaders => run_shaders()?,
        Commands::Test => run_tests()?,
        Commands::Doc => run_doc()?,
        Commands::Build => run_build()?,
    }

    Ok(())
}

fn cargo(args: &[&str], what: &str) -> Result<()> {
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{what} failed");
    }
    Ok(())
}

fn run_fmt() -> Result<()> {
    println!("==> Running cargo fmt --check");
    cargo(&["fmt", "--all", "--", "--check"], "cargo fmt check")
}

fn run_clippy() -> Result<()> {
    println!("==> Running cargo clippy");
    cargo(
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
        "cargo clippy",
    )
}

fn run_tests() -> Result<()> {
    println!("==> Running cargo test");
    cargo(&["test", "--workspace"], "cargo test")
}

fn run_doc() -> Result<()> {
    println!("==> Running cargo doc");
    cargo(&["doc", "--workspace", "--no-deps"], "cargo doc")
}

fn run_build() -> Result<()> {
    println!("==> Running cargo build");
    cargo(&["build", "--workspace"], "cargo build")
}

fn run_shaders() -> Result<()> {
    println!("==> Validating WGSL shaders");
    let res = Path::new(env!("CARGO_MANIFEST_DIR")).join("../res");

    let mut files = Vec::new();
    collect_wgsl(&res, &mut files)?;
    files.sort();

    let mut checked = 0usize;
    for path in &files {
        let Some(stage) = stage_for(path) else {
            println!("    skipping {}: not a .vert.wgsl or .frag.wgsl stage", path.display());
            continue;
        };
        let source = read(path)?;
        compile(stage, &source).with_context(|| format!("{}", path.display()))?;
        checked += 1;
    }
    println!("    {checked} file(s) valid");

    let dir = res.join("shaders");
    let vertex = compile(
        ShaderStage::Vertex,
        &read(&dir.join(grid_render::VERTEX_SHADER))?,
    )?;
    let fragment = compile(
        ShaderStage::Fragment,
        &read(&dir.join(grid_render::FRAGMENT_SHADER))?,
    )?;
    let program = link(vertex, fragment)?;
    for name in ["projection", "view", "model", "color"] {
        if !program.uniforms.members.contains_key(name) {
            anyhow::bail!("shipped shader has no `{name}` uniform");
        }
    }
    println!("    solid-color program links ({} byte uniform block)", program.uniforms.size);
    Ok(())
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("read WGSL: {}", path.display()))
}

/// Stage named by the file suffix; other WGSL files are not shader stages.
fn stage_for(path: &Path) -> Option<ShaderStage> {
    let name = path.file_name().and_then(|n| n.to_str())?;
    if name.ends_with(".vert.wgsl") {
        Some(ShaderStage::Vertex)
    } else if name.ends_with(".frag.wgsl") {
        Some(ShaderStage::Fragment)
    } else {
        None
    }
}

fn collect_wgsl(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir).with_context(|| format!("read dir: {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_wgsl(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("wgsl") {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_comes_from_the_file_suffix() {
        assert_eq!(stage_for(Path::new("res/shaders/solidcolor.vert.wgsl")), Some(ShaderStage::Vertex));
        assert_eq!(stage_for(Path::new("res/shaders/solidcolor.frag.wgsl")), Some(ShaderStage::Fragment));
    }

    #[test]
    fn unsuffixed_wgsl_is_not_a_stage() {
        assert_eq!(stage_for(Path::new("res/shaders/common.wgsl")), None);
        assert_eq!(stage_for(Path::new("res/shaders/vert.wgsl")), None);
    }
}
