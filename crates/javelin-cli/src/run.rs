//! Run command implementation for Javelin CLI.
//!
//! Executes a notebook headlessly, one cell after another, in a single
//! session. Ctrl+C interrupts the running cell.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use javelin_core::{Cell, CellKind, CellOutput, CellStatus, KernelConfig, Resolver, Session, SessionDirs};

use crate::colors;
use crate::notebook::parse_notebook;

/// Execute a notebook.
pub async fn execute(notebook_path: &str, config: &KernelConfig, fail_fast: bool) -> anyhow::Result<()> {
    let start = Instant::now();
    let path = Path::new(notebook_path);
    if !path.exists() {
        anyhow::bail!("Notebook not found: {}", notebook_path);
    }

    let text = std::fs::read_to_string(path)?;
    let cells = parse_notebook(&text);

    println!(
        "\n{}Running{} {}",
        colors::BOLD,
        colors::RESET,
        path.display()
    );
    println!("{}", "─".repeat(50));

    if cells.is_empty() {
        println!(
            "\n{}No cells found in notebook.{}",
            colors::YELLOW,
            colors::RESET
        );
        println!("Cells are separated by '// %%' lines");
        return Ok(());
    }

    let resolver = Arc::new(Resolver::new(config)?);
    let dirs = SessionDirs::from_notebook_path(path)?;
    let mut session = Session::start(config, resolver, dirs).await?;

    let interrupt = session.interrupt_handle();
    let ctrl_c = tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            interrupt.interrupt();
        }
    });

    let mut failed = 0;
    let mut ran = 0;
    for cell in &cells {
        if cell.kind == CellKind::Markdown {
            continue;
        }
        let output = session.execute(cell).await;
        ran += 1;
        print_cell(cell, &output);
        if !output.status.is_ok() {
            failed += 1;
            if fail_fast {
                break;
            }
        }
    }

    ctrl_c.abort();
    session.shutdown().await?;

    let total_time = start.elapsed();
    println!("\n{}", "─".repeat(50));
    if failed == 0 {
        println!(
            "{}Completed{} {} cells in {:.2}s",
            colors::GREEN,
            colors::RESET,
            ran,
            total_time.as_secs_f64()
        );
        Ok(())
    } else {
        println!(
            "{}Failed{} {} of {} cells in {:.2}s",
            colors::RED,
            colors::RESET,
            failed,
            ran,
            total_time.as_secs_f64()
        );
        anyhow::bail!("{} cell(s) failed", failed)
    }
}

fn print_cell(cell: &Cell, output: &CellOutput) {
    let (color, mark) = match output.status {
        CellStatus::Ok => (colors::GREEN, "✓"),
        CellStatus::Cancelled => (colors::YELLOW, "⊘"),
        _ => (colors::RED, "✗"),
    };
    let first_line = cell.source.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    println!(
        "{}  ▶ [{}]{} {}{}{} {}{}{}",
        colors::CYAN,
        cell.index,
        colors::RESET,
        colors::DIM,
        first_line.trim(),
        colors::RESET,
        color,
        mark,
        colors::RESET
    );

    for entry in &output.classpath {
        println!("{}    + {}{}", colors::DIM, entry, colors::RESET);
    }
    if !output.declarations.is_empty() {
        println!(
            "{}    declared:{} {}",
            colors::DIM,
            colors::RESET,
            output.declarations.join(", ")
        );
    }
    for line in output.text_output.lines() {
        println!("    {line}");
    }
    if let Some(error) = &output.error
        && output.text_output.is_empty()
    {
        eprintln!("{}    Error:{} {}", colors::RED, colors::RESET, error.message);
    }
}
