use clap::Parser;
use rand::Rng;
use stampbench::assembler::NativeX64Provider;
use stampbench::codegen::MarginPolicy;
use stampbench::driver::{BenchmarkDriver, DriverConfig};
use stampbench::report::{ConsoleReporter, JsonReporter, Reporter};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Size of the executable region in bytes
    #[arg(long, default_value_t = 4096 * 10)]
    size: usize,

    /// Integer input passed to the generated function
    #[arg(long, default_value_t = 100)]
    input: i32,

    /// Draw the input from 0..1000 instead of using --input
    #[arg(long)]
    random_input: bool,

    /// Reserve the epilogue's true length as tail margin instead of the
    /// historical prologue-sized margin
    #[arg(long)]
    corrected_margin: bool,

    /// Emit the report as JSON
    #[arg(long)]
    json: bool,

    /// Skip core pinning and priority changes (no privileges required)
    #[arg(long)]
    skip_env: bool,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let input = if args.random_input {
        rand::thread_rng().gen_range(0..1000)
    } else {
        args.input
    };

    let config = DriverConfig {
        region_size: args.size,
        input,
        margin_policy: if args.corrected_margin {
            MarginPolicy::EpilogueLength
        } else {
            MarginPolicy::PrologueLength
        },
        control_environment: !args.skip_env,
    };

    let provider = NativeX64Provider;
    let reporter: Box<dyn Reporter> = if args.json {
        Box::new(JsonReporter)
    } else {
        Box::new(ConsoleReporter)
    };

    let mut driver = BenchmarkDriver::new(config, &provider);
    match driver.run(reporter.as_ref()) {
        Ok(report) => {
            info!(
                result = report.result,
                duration_us = report.duration_us,
                "measurement complete"
            );
        }
        Err(_) => {
            // The reporter has already surfaced the failing step.
            std::process::exit(1);
        }
    }
}
