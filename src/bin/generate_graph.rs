use std::process;

use covid_graph::{default_output, env_base_dir, generate_graph, init_logging, naive_today, run_batch, CliArgs, Config, Error, Layout};


fn main() -> Result<(), Box<dyn std::error::Error>> {
	init_logging();
	let argv: Vec<String> = std::env::args().collect();
	let args = CliArgs::parse(argv[1..].iter().cloned())?;
	let opts = args.options(naive_today());
	if opts.mobility_pattern.is_none() {
		eprintln!("usage: {} -m MOBILITY_PATTERN [ISO3...]", argv[0]);
		process::exit(2);
	}
	let layout = Layout::new(env_base_dir());
	let config = Config::from_file(layout.config_file())?;
	let mut progress = default_output();
	let report = run_batch(&args.countries_or_all(&config), |iso3| {
		let country = config.country(iso3)?;
		let mobility = opts.mobility_path(iso3).ok_or_else(|| Error::config("no mobility pattern"))?;
		generate_graph(&mut *progress, &layout, &country, &mobility)?;
		Ok(())
	});
	if !report.is_success() {
		process::exit(1);
	}
	Ok(())
}
