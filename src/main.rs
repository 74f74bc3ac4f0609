use faultline::{Config, Server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let handle = Server::bind(&cfg)?.spawn()?;
    tracing::info!(addr = %handle.addr(), "Origin started");

    let stop = handle.stop_handle();
    let mut server = tokio::task::spawn_blocking(move || handle.wait());

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!("Shutdown signal received");
            stop.stop()?;
            server.await??;
        }

        res = &mut server => {
            res??;
        }
    }

    Ok(())
}
