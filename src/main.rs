use rpa_dashboard::dashboard::Dashboard;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let services = match rpa_dashboard::start().await {
        Ok(services) => services,
        Err(e) => {
            log::error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    Dashboard::new(&services).run().await?;
    log::info!("Dashboard closed");
    Ok(())
}
