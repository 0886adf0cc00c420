//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use crate::adapters::csv_adapter::CsvPanelAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestRun, Simulator};
use crate::domain::config_validation::{RunSetup, load_run_setup};
use crate::domain::ensemble::{EnsembleEngine, EnsembleResult};
use crate::domain::error::EnsembleError;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::{ReportPort, RunReport};

#[derive(Parser, Debug)]
#[command(
    name = "ensemble-trader",
    about = "Ensemble strategy ranking and portfolio backtester"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rank assets with the configured strategy ensemble and backtest the result
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Price CSV with columns date,ticker,open,high,low,close,volume
        #[arg(short, long)]
        data: PathBuf,
        /// Directory to write CSV reports into
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file without running anything
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Summarize a price CSV
    Info {
        #[arg(short, long)]
        data: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            data,
            output,
        } => run_backtest(&config, &data, output.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::Info { data } => run_info(&data),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, EnsembleError> {
    let adapter = FileConfigAdapter::from_file(path)?;
    info!(path = %path.display(), "configuration loaded");
    Ok(adapter)
}

/// Output of one full ensemble + backtest pass.
#[derive(Debug)]
pub struct PipelineOutput {
    pub ensemble: EnsembleResult,
    pub backtest: BacktestRun,
}

/// Load prices, rank, select and simulate. Nothing is written anywhere.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    setup: RunSetup,
) -> Result<PipelineOutput, EnsembleError> {
    let panel = data_port.load_panel(setup.start_date, setup.end_date)?;

    let engine = EnsembleEngine::new(setup.strategies, setup.ensemble)?;
    let ensemble = engine.run(&panel)?;

    let mut simulator = Simulator::new(setup.backtest)?;
    simulator.run(&panel, &ensemble.selections)?;
    let backtest = simulator.into_result()?;

    Ok(PipelineOutput { ensemble, backtest })
}

fn run_backtest(
    config_path: &Path,
    data_path: &Path,
    output: Option<&Path>,
) -> Result<(), EnsembleError> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;
    let setup = load_run_setup(&adapter)?;
    let names: Vec<&str> = setup.strategies.iter().map(|s| s.name()).collect();
    eprintln!("Strategies: {}", names.join(", "));

    eprintln!("Loading prices from {}", data_path.display());
    let data_port = CsvPanelAdapter::new(data_path);
    let out = run_backtest_pipeline(&data_port, setup)?;

    print_report(&out);

    if let Some(dir) = output {
        let report = RunReport {
            ensemble: &out.ensemble,
            backtest: &out.backtest,
        };
        CsvReportAdapter::new().write(&report, dir)?;
        eprintln!("\nReport written to: {}", dir.display());
    }
    Ok(())
}

fn print_report(out: &PipelineOutput) {
    let summary = out.ensemble.summary();
    let m = &out.backtest.metrics;

    eprintln!("\n=== Ensemble ===");
    eprintln!("Strategies:       {}", summary.strategy_names.join(", "));
    eprintln!("Rebalances:       {}", summary.rebalance_count);
    eprintln!(
        "Combined score:   mean {:.3}, std {:.3}",
        summary.mean_combined_score, summary.std_combined_score
    );

    let corr = &out.ensemble.correlation;
    if corr.len() > 1 {
        eprintln!("\n=== Strategy Correlation ===");
        for (i, a) in corr.strategies.iter().enumerate() {
            for (j, b) in corr.strategies.iter().enumerate().skip(i + 1) {
                eprintln!("  {a} / {b}: {:.3}", corr.values[i][j]);
            }
        }
    }

    eprintln!("\n=== Performance ===");
    eprintln!("Final Value:      {:.2}", m.final_value);
    eprintln!("Total Return:     {:.2}%", m.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", m.annualized_return * 100.0);
    eprintln!("Volatility:       {:.2}%", m.annualized_volatility * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", m.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", m.sortino_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", m.max_drawdown * 100.0);
    eprintln!("DD Duration:      {} days", m.max_drawdown_duration);
    eprintln!("Win Rate:         {:.1}%", m.win_rate * 100.0);
    eprintln!("Total Trades:     {}", m.total_trades);
    eprintln!(
        "Costs:            {:.2} commission, {:.2} slippage",
        m.total_commission, m.total_slippage
    );
    eprintln!("Avg Positions:    {:.2}", m.average_positions);

    if let Some(last) = out.ensemble.selections.iter().rev().find(|s| !s.is_empty()) {
        eprintln!("\n=== Latest Selection ({}) ===", last.date);
        for entry in &last.entries {
            eprintln!(
                "  {:<10} weight {:>6.2}%  score {:+.3}",
                entry.ticker,
                entry.weight * 100.0,
                entry.score
            );
        }
    }
}

fn run_validate(config_path: &Path) -> Result<(), EnsembleError> {
    let adapter = load_config(config_path)?;
    let setup = load_run_setup(&adapter)?;
    // Engine construction catches cross-field problems such as duplicate names.
    let engine = EnsembleEngine::new(setup.strategies, setup.ensemble)?;
    Simulator::new(setup.backtest)?;

    info!(path = %config_path.display(), "configuration valid");
    println!("Configuration is valid.");
    println!("  Strategies: {}", engine.strategy_names().join(", "));
    println!(
        "  Top N: {}, rebalance: {}, weighting: {}, long only: {}",
        engine.config().top_n,
        engine.config().rebalance,
        engine.config().weighting,
        engine.config().long_only
    );
    Ok(())
}

fn run_info(data_path: &Path) -> Result<(), EnsembleError> {
    let panel = CsvPanelAdapter::new(data_path).load_panel(None, None)?;

    println!(
        "{} tickers, {} dates, {} bars",
        panel.ticker_count(),
        panel.dates().len(),
        panel.bar_count()
    );
    if let (Some(first), Some(last)) = (panel.first_date(), panel.last_date()) {
        println!("Range: {first} to {last}");
    }
    println!("{:<12} {:<12} {:<12} {:>8}", "Ticker", "First", "Last", "Bars");
    for series in panel.iter_series() {
        if let (Some(first), Some(last)) = (series.bars.first(), series.bars.last()) {
            println!(
                "{:<12} {:<12} {:<12} {:>8}",
                series.ticker,
                first.date.to_string(),
                last.date.to_string(),
                series.bar_count()
            );
        }
    }
    Ok(())
}
