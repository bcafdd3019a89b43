fn main() {
    grainsize_pipeline::cli::run();
}
