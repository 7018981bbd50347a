fn main() -> anyhow::Result<()> {
    blockguard_lib::run()
}
