fn main() {
    if let Err(err) = buoy_etl::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
