use anyhow::Context;
use clap::Parser;
use serde_json::json;

use asmjudge::config::CliArgs;
use asmjudge::create_timestamp;
use asmjudge::grading;
use asmjudge::judge::{Judge, Submission};
use asmjudge::suite::{self, SuiteMode, TestCase};
use asmjudge::toolchain::NasmToolchain;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let config = cli.to_config()?;

    let source_code = std::fs::read_to_string(&cli.source)
        .with_context(|| format!("cannot read submission {}", cli.source.display()))?;

    // Toolchain resolution failure is a deployment problem; fail up front
    // rather than attributing it to the submission.
    let toolchain = NasmToolchain::resolve(&config)?;
    let workspace_root = config.workspace_root()?;
    let judge = Judge::new(toolchain, workspace_root);

    let mut options = config.defaults.clone();
    if cli.allow_restricted {
        options.allow_restricted = true;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        options.timeout_ms = timeout_ms;
    }

    if cli.validate {
        let report = judge
            .validate_syntax(&source_code, options.allow_restricted)
            .await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(tests_path) = &cli.tests_path {
        let file = std::fs::File::open(tests_path)
            .with_context(|| format!("cannot open test suite {}", tests_path.display()))?;
        let cases: Vec<TestCase> =
            serde_json::from_reader(std::io::BufReader::new(file)).context("malformed test suite")?;

        let mode = if cli.quick {
            SuiteMode::Quick
        } else {
            SuiteMode::Full
        };
        let results = suite::run_suite(&judge, &source_code, &cases, &options, mode).await;
        let grade = grading::grade(&source_code, &results, &cases);

        log::info!(
            "Suite finished: {}/{} passed, grade {} ({:.1}%)",
            results.iter().filter(|r| r.passed).count(),
            results.len(),
            grade.letter,
            grade.percentage
        );
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "judged_at": create_timestamp(),
                "results": results,
                "grade": grade,
            }))?
        );
        return Ok(());
    }

    let submission = match &cli.input {
        Some(input) => Submission::new(source_code).with_stdin(input.clone()),
        None => Submission::new(source_code),
    }
    .with_options(options);

    let outcome = judge.compile_and_run(&submission).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
