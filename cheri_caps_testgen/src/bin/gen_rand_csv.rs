use std::error::Error;

use clap::{Parser, ValueEnum};
use csv::WriterBuilder;

use rand::{rngs::StdRng, seq::SliceRandom, thread_rng, SeedableRng};
use cheri_caps_testgen::{gen_in_category, CapVariant, TestCategory};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The filename to output generated tests into
    #[arg(short)]
    out_file: Option<String>,

    #[arg(long)]
    seed: Option<u64>,

    /// Number of capabilities to generate for each category.
    #[arg(short, long, default_value_t = 10)]
    n_caps_per_category: usize,

    #[arg(long, value_enum, default_value_t = CapVariant::Cc256)]
    cap: CapVariant,

    #[arg(long, value_enum, num_args = 0..)]
    category: Vec<TestCategory>,

    /// Generate every category, ignoring --category.
    #[arg(long = "all", default_value_t = false)]
    all_categories: bool,

    #[arg(long, default_value_t = false)]
    shuffle: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    let categories = if args.all_categories {
        TestCategory::value_variants().to_vec()
    } else {
        args.category.clone()
    };

    if categories.is_empty() {
        return Err("Please select at least one capability category to generate using cmdline options (see -h)".into());
    }

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(thread_rng())?,
    };

    let mut tests = vec![];
    for category in &categories {
        log::info!("generating {} {:?} cases for {:?}", args.n_caps_per_category, category, args.cap);
        for _ in 0..args.n_caps_per_category {
            let test = gen_in_category(&mut rng, args.cap, *category);
            // A row that doesn't agree with the reference codec is a generator bug
            test.verify()?;
            tests.push(test);
        }
    }

    if args.shuffle {
        tests.shuffle(&mut rng);
    }

    let io_wtr: Box<dyn std::io::Write> = match &args.out_file {
        Some(real_file) => Box::new(std::fs::File::create(real_file)?),
        None => Box::new(std::io::stdout()),
    };
    let mut wtr = WriterBuilder::new().delimiter(b':').from_writer(io_wtr);
    for test in &tests {
        wtr.serialize(test)?;
    }
    wtr.flush()?;
    log::info!("wrote {} test cases", tests.len());

    Ok(())
}
