fn main() -> anyhow::Result<()> {
    mdnotes::cli::run()
}
