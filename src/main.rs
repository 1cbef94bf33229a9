use std::{
    fs::File,
    io::{self, BufWriter},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::Parser;

/// Compile one function's RTL expand dump to ARM assembly.
#[derive(Parser)]
struct Args {
    /// expand dump holding one function
    #[arg(value_name = "FILE")]
    src: PathBuf,

    /// assembly output, stdout when absent
    #[arg(short, long, value_name = "FILE")]
    out: Option<PathBuf>,

    /// also write a Graphviz view of the block graph
    #[arg(long, value_name = "FILE")]
    dot: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let file = File::open(args.src.as_path())
        .with_context(|| format!("failed to open {}", args.src.display()))?;
    let (cfg, regs) = rtlc::analyze(file)
        .with_context(|| format!("failed to analyze {}", args.src.display()))?;

    if let Some(path) = &args.dot {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        rtlc::dot::write_dot(&cfg, "main", &mut BufWriter::new(file))?;
    }

    match &args.out {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            rtlc::codegen::emit::write_function(&cfg, &regs, &mut BufWriter::new(file))?;
        }
        None => {
            let stdout = io::stdout();
            rtlc::codegen::emit::write_function(&cfg, &regs, &mut stdout.lock())?;
        }
    }

    Ok(())
}
