use pqpack::{parse_args, ChunkedConverter, USAGE};
use std::env;
use std::time::Instant;

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        eprintln!("{USAGE}");
        std::process::exit(if args.is_empty() { 1 } else { 0 });
    }

    let opts = match parse_args(&args) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("error: {e:#}\n\n{USAGE}");
            std::process::exit(1);
        }
    };

    let start = Instant::now();
    let report = ChunkedConverter::from_options(opts).run();
    println!("{}", report.to_json_pretty());
    eprintln!("finished in {:.1}s", start.elapsed().as_secs_f64());

    if !report.success {
        std::process::exit(1);
    }
}
