use std::process;

use covid_graph::{default_output, env_base_dir, init_logging, naive_today, run_batch, run_country, CliArgs, Config, Layout};


fn main() -> Result<(), Box<dyn std::error::Error>> {
	init_logging();
	let argv: Vec<String> = std::env::args().collect();
	let args = CliArgs::parse(argv[1..].iter().cloned())?;
	let layout = Layout::new(env_base_dir());
	let config = Config::from_file(layout.config_file())?;
	let opts = args.options(naive_today());
	let mut progress = default_output();
	let report = run_batch(&args.countries_or_all(&config), |iso3| {
		run_country(&mut *progress, &layout, &config, iso3, &opts)
	});
	if !report.is_success() {
		for (iso3, msg) in report.failed.iter() {
			eprintln!("{}: {}", iso3, msg);
		}
		process::exit(1);
	}
	Ok(())
}
