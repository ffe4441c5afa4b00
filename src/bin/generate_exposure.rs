use std::process;

use covid_graph::{default_output, env_base_dir, generate_exposure, init_logging, run_batch, CliArgs, Config, Layout};


fn main() -> Result<(), Box<dyn std::error::Error>> {
	init_logging();
	let argv: Vec<String> = std::env::args().collect();
	let args = CliArgs::parse(argv[1..].iter().cloned())?;
	let layout = Layout::new(env_base_dir());
	let config = Config::from_file(layout.config_file())?;
	let mut progress = default_output();
	let report = run_batch(&args.countries_or_all(&config), |iso3| {
		let country = config.country(iso3)?;
		generate_exposure(&mut *progress, &layout, &country)?;
		Ok(())
	});
	if !report.is_success() {
		process::exit(1);
	}
	Ok(())
}
