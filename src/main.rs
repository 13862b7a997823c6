use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use cwmtest::method::perm_test::run_cwm_test;
use cwmtest::method::summary::{render_table, render_verbose};
use cwmtest::model::cwm::weighted_mean;
use cwmtest::model::error::{CwmError, CwmResult};
use cwmtest::model::matrix::{AbundanceMatrix, AttributeMatrix, EnvData};
use cwmtest::model::method::{CorrCoef, Dependence, ExecutionMode, TestKind, TestMethod};
use cwmtest::model::params::TestParams;
use cwmtest::model::table::{read_factor_column, NamedTable};

/// Test relationships between community-weighted means of species
/// attributes and environmental variables, with standard (row-permutation)
/// and modified (attribute-permutation) significance tests.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Sample-by-species abundance table (CSV, first column = sample names)
    #[arg(long)]
    abundance: PathBuf,

    /// Species-by-attribute table (CSV, NA/empty = missing)
    #[arg(long)]
    attributes: PathBuf,

    /// Environmental variable table (CSV, one or more columns)
    #[arg(long)]
    env: PathBuf,

    /// Treat the environmental variable as a categorical factor
    #[arg(long)]
    factor: bool,

    /// Statistical method
    #[arg(long, value_enum, default_value_t = TestMethod::Lm)]
    method: TestMethod,

    /// Correlation coefficient (method = cor)
    #[arg(long, value_enum, default_value_t = CorrCoef::Pearson)]
    corr: CorrCoef,

    /// Which side of the relationship the weighted mean sits on
    #[arg(long, value_enum, default_value_t = Dependence::Auto)]
    dependence: Dependence,

    /// Which permutation tests to run
    #[arg(long, value_enum, default_value_t = TestKind::Both)]
    test: TestKind,

    /// Number of permutation draws
    #[arg(long, default_value_t = 999)]
    permutations: usize,

    /// Worker threads for permutation draws (1 = sequential)
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Random seed for reproducible permutation streams
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Print a per-attribute narrative summary as well as the table
    #[arg(short, long)]
    verbose: bool,
}

fn load_env(cli: &Cli, sample_names: &[String]) -> CwmResult<EnvData> {
    if cli.factor {
        let (rows, name, values) = read_factor_column(&cli.env)?;
        check_names("environment", sample_names, &rows)?;
        Ok(EnvData::from_factor(&name, &values))
    } else {
        let table = NamedTable::from_path(&cli.env)?;
        check_names("environment", sample_names, &table.row_names)?;
        EnvData::from_columns(table.col_names, table.matrix)
    }
}

fn check_names(what: &str, expected: &[String], found: &[String]) -> CwmResult<()> {
    if expected != found {
        return Err(CwmError::DimensionMismatch(format!(
            "{} row names do not match the abundance sample names",
            what
        )));
    }
    Ok(())
}

fn run(cli: &Cli) -> CwmResult<()> {
    let abundance_table = NamedTable::from_path(&cli.abundance)?;
    let abundance = AbundanceMatrix::new(
        abundance_table.row_names,
        abundance_table.col_names,
        abundance_table.matrix,
    )?;

    let attribute_table = NamedTable::from_path(&cli.attributes)?;
    check_names("attribute", &abundance.species, &attribute_table.row_names)?;
    let attributes = AttributeMatrix::new(
        attribute_table.row_names,
        attribute_table.col_names,
        attribute_table.matrix,
    )?;

    let env = load_env(cli, &abundance.samples)?;

    let wm = weighted_mean(&abundance, &attributes)?;
    let params = TestParams::new(
        cli.method,
        cli.corr,
        cli.dependence,
        cli.test,
        cli.permutations,
        ExecutionMode::from_threads(cli.threads),
        cli.seed,
    );

    let outcomes = run_cwm_test(&wm, &env, &params)?;
    print!("{}", render_table(&outcomes));
    if cli.verbose {
        println!();
        print!("{}", render_verbose(&outcomes));
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
