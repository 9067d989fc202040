use std::fs::File;
use std::io::{BufWriter, Write};

use clap::Parser;

use orneta::cli::{Cli, Commands, SelectKmersArgs};
use orneta::config::AssemblyConfig;
use orneta::error::{AssemblyError, Result};
use orneta::kmers::{decode_kmer, select_kmers, KmerSelectionConfig, KmerSelectionMethod};
use orneta::pipeline::{run_assembly, StartStage};
use orneta::reads::ReadStore;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    // exit codes: 0 success, 1 invalid options, 2 runtime/resource error,
    // 3 other failure, 4 unknown
    let outcome = std::panic::catch_unwind(|| run(&cli));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            log::error!("{}", error);
            std::process::exit(error.exit_code());
        }
        Err(_) => {
            log::error!("unexpected failure");
            std::process::exit(4);
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Assemble(args) => {
            let config: AssemblyConfig = args.into();
            config.validate()?;
            let start_stage = StartStage::from_name(&args.start_at)?;

            // fixed worker pool, sized once for the whole run
            rayon::ThreadPoolBuilder::new()
                .num_threads(config.threads)
                .build_global()
                .map_err(|e| AssemblyError::Resource(format!("cannot build worker pool: {}", e)))?;
            log::info!("Using {} worker threads", config.threads);

            let stats = run_assembly(&config, &args.input, &args.output_dir, start_stage)?;
            log::info!(
                "Done: {} segments, {} bases assembled, N50 {}, longest {}",
                stats.segment_count,
                stats.total_length,
                stats.n50,
                stats.longest
            );
            Ok(())
        }
        Commands::SelectKmers(args) => select_kmers_command(args),
    }
}

fn select_kmers_command(args: &SelectKmersArgs) -> Result<()> {
    let config = KmerSelectionConfig {
        k: args.k,
        density: args.marker_density,
        seed: args.seed,
        method: KmerSelectionMethod::Random,
        enrichment_threshold: 0.0,
        close_pair_distance: 0,
        file: None,
    };
    if args.k % 2 == 0 {
        return Err(AssemblyError::config(format!(
            "kmers.k must be odd, got {}",
            args.k
        )));
    }
    if args.k > 15 {
        return Err(AssemblyError::config(format!(
            "kmers.k must be at most 15, got {}",
            args.k
        )));
    }
    if !(0.0 < args.marker_density && args.marker_density <= 1.0) {
        return Err(AssemblyError::config(format!(
            "kmers.markerDensity must be in (0, 1], got {}",
            args.marker_density
        )));
    }
    // random selection does not look at reads
    let table = select_kmers(&config, &ReadStore::new())?;

    let mut writer = BufWriter::new(File::create(&args.output)?);
    for id in 0..table.kmer_count() as u64 {
        if table.is_marker(id) {
            writer.write_all(&decode_kmer(id, args.k))?;
            writeln!(writer)?;
        }
    }
    log::info!(
        "Wrote {} marker k-mers to {}",
        table.marker_count(),
        args.output.display()
    );
    Ok(())
}
