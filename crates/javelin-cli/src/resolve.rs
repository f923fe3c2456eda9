//! Resolve command implementation for Javelin CLI.

use std::time::Instant;

use javelin_core::{Coordinate, KernelConfig, Resolver};

use crate::colors;

/// Resolve coordinates and print artifacts plus a classpath string.
pub async fn execute(coordinates: &[String], config: &KernelConfig) -> anyhow::Result<()> {
    let start = Instant::now();
    let coordinates = coordinates
        .iter()
        .map(|c| Coordinate::parse(c))
        .collect::<Result<Vec<_>, _>>()?;

    let resolver = Resolver::new(config)?;
    let artifacts = resolver
        .resolve(&coordinates)
        .await
        .map_err(javelin_core::Error::from)?;

    for artifact in &artifacts {
        match &artifact.path {
            Some(path) => println!(
                "{}  ◆{} {} {}{}{}",
                colors::CYAN,
                colors::RESET,
                artifact.coordinate(),
                colors::DIM,
                path.display(),
                colors::RESET
            ),
            None => println!(
                "{}  ◆{} {} {}(pom){}",
                colors::CYAN,
                colors::RESET,
                artifact.coordinate(),
                colors::DIM,
                colors::RESET
            ),
        }
    }

    let classpath = std::env::join_paths(artifacts.iter().filter_map(|a| a.path.clone()))?;
    println!("\n{}", classpath.to_string_lossy());
    eprintln!(
        "{}Resolved{} {} artifacts in {:.2}s",
        colors::GREEN,
        colors::RESET,
        artifacts.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
