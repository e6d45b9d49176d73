fn main() {
    if let Err(err) = nestedset::cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
