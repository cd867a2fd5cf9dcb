#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() {
	let args = crate8::args::get_args();

	let runtime = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.expect("failed to start tokio runtime");

	let exit_code = match runtime.block_on(crate8::run(args)) {
		Ok(()) => 0,
		Err(error) => {
			let code = error.exit_code();
			eprintln!("{:?}", miette::Report::new(error));
			code
		}
	};

	std::process::exit(exit_code);
}
