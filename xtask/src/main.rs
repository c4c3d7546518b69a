//! Workspace maintenance tasks: `cargo xtask <command>`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use segcam::gpu::compute::reflect_kernels;
use segcam::gpu::shader_composer::{Shader, ShaderComposer};
use segcam::options::Options;

#[derive(Parser)]
#[command(about = "Build tasks for the segcam workspace")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compose and validate every WGSL shader, listing compute kernels.
    Shaders,
    /// Print the JSON schema of the options file.
    Schema,
}

fn shaders() -> Result<()> {
    let mut composer = ShaderComposer::new()?;
    for shader in Shader::ALL {
        let module = composer
            .compose_naga(shader.source(), shader.file_path())
            .with_context(|| format!("composing {}", shader.file_path()))?;
        let kernels = reflect_kernels(&module)
            .with_context(|| format!("validating {}", shader.file_path()))?;
        println!("ok  {}", shader.file_path());
        for kernel in kernels {
            let params: Vec<&str> =
                kernel.parameters.iter().map(|p| p.name.as_str()).collect();
            println!(
                "    {} {:?} ({})",
                kernel.name,
                kernel.workgroup_size,
                params.join(", ")
            );
        }
    }
    Ok(())
}

fn schema() -> Result<()> {
    let schema = serde_json::to_string_pretty(&Options::json_schema())?;
    println!("{schema}");
    Ok(())
}

fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Shaders => shaders(),
        Command::Schema => schema(),
    }
}
