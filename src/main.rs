//! guardlift CLI entry point.

mod cli;

use std::path::{Path, PathBuf};

use clap::Parser;
use cli::{Cli, Command, PassArg};
use guardlift::{LoweringConfig, TracingLogger, lower_file};
use guardlift_ir::{OpName, parse_graph, print_graph, verify_graph};
use guardlift_passes::PromotableKinds;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Command::Lower {
            file,
            promote,
            passes,
            no_dce,
            verify,
            max_iterations,
            output,
        } => {
            let config = build_config(promote, passes, no_dce, verify, max_iterations);
            lower(&file, &config, output)
        }
        Command::Verify { file } => verify(&file),
    };

    if let Err(e) = outcome {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn build_config(
    promote: Vec<OpName>,
    passes: Vec<PassArg>,
    no_dce: bool,
    verify: bool,
    max_iterations: Option<usize>,
) -> LoweringConfig {
    let mut config = LoweringConfig::new().run_dce(!no_dce);
    if verify {
        config = config.verify(true);
    }
    if !promote.is_empty() {
        config = config.promotable_kinds(promote.into_iter().collect::<PromotableKinds>());
    }
    if !passes.is_empty() {
        config = config.passes(passes.into_iter().map(Into::into));
    }
    if let Some(n) = max_iterations {
        config = config.max_iterations(n);
    }
    config
}

fn lower(file: &Path, config: &LoweringConfig, output: Option<PathBuf>) -> guardlift::Result<()> {
    let lowered = lower_file(file, config, &TracingLogger)?;
    for outcome in &lowered.outcomes {
        tracing::info!(
            pass = %outcome.pass,
            rewritten = outcome.report.rewritten,
            iterations = outcome.report.iterations,
            "lowering summary"
        );
    }

    let text = print_graph(&lowered.graph);
    match output {
        Some(path) => std::fs::write(path, text)?,
        None => print!("{text}"),
    }
    Ok(())
}

fn verify(file: &Path) -> guardlift::Result<()> {
    let source = std::fs::read_to_string(file)?;
    let graph = parse_graph(&source)?;
    let result = verify_graph(&graph);
    if !result.is_ok() {
        return Err(guardlift::Error::Validation {
            stage: "parse",
            result,
        });
    }
    println!("{}: ok ({} nodes)", file.display(), graph.live_node_count());
    Ok(())
}
