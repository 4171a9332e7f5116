use anyhow::Result;
use mqtt_pvinverter::PvInverterDriver;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let driver = PvInverterDriver::from_environment()
        .map_err(|e| anyhow::anyhow!("Failed to create driver: {}", e))?;

    info!(
        "MQTT PV inverter bridge {} starting up",
        env!("APP_VERSION")
    );

    match driver.run().await {
        Ok(summary) => {
            info!(
                "Shutdown complete after {} ticks (revision {})",
                summary.ticks, summary.revision
            );
            Ok(())
        }
        Err(e) => {
            error!("Driver failed with error: {}", e);
            Err(anyhow::anyhow!("Driver error: {}", e))
        }
    }
}
