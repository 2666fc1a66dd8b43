fn main() -> anyhow::Result<()> {
    loopback_recorder_lib::run()
}
