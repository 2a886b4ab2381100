//! Demo: replay a canned weighing session through the full pipeline.
//!
//! A simulated transport stands in for the radio stack and delivers the kind
//! of notification stream a real scale produces: heartbeats while empty, a
//! few settling frames, repeated stable frames, then a device-initiated
//! disconnect.

use anyhow::Result;
use embassy_futures::select::select;
use log::info;
use scalelink::sim::{fixed_weight_frame, scan_weight_frame, SimulatedTransport};
use scalelink::{ConnectionStatus, ReadingChannel, ScaleMonitor};
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut transport = SimulatedTransport::new();
    // Empty scale.
    transport.push_frame(&[0u8; 8]);
    transport.push_frame(&[0u8; 8]);
    // A bowl lands and settles at 121.8 g.
    transport.push_frame(&scan_weight_frame(false, 850, 1, false));
    transport.push_frame(&scan_weight_frame(false, 1113, 1, false));
    transport.push_frame(&fixed_weight_frame(0x00, 1218, 1));
    transport.push_frame(&fixed_weight_frame(0x00, 1218, 1));
    // Something the decoder has never seen.
    transport.push_frame(&[0x42, 0x13, 0x37]);
    // Flour added, settling at 245.0 g.
    transport.push_frame(&scan_weight_frame(false, 2001, 1, false));
    transport.push_frame(&fixed_weight_frame(0x00, 2450, 1));
    // The scale powers itself off.
    transport.disconnect_at_end(true);

    let mut monitor = ScaleMonitor::new(transport);
    let readings = monitor.stable_readings();

    embassy_futures::block_on(async {
        let status = monitor.connect().await;
        if status != ConnectionStatus::Active {
            anyhow::bail!("connect failed: {:?}", status);
        }
        select(monitor.run_session(), announce(readings)).await;
        Ok(())
    })?;

    info!("session over, final status: {:?}", monitor.status());
    Ok(())
}

async fn announce(readings: Arc<ReadingChannel>) {
    loop {
        let reading = readings.receive().await;
        info!(
            "=> stable weight: {:.1} {}",
            reading.weight,
            reading.unit.suffix()
        );
    }
}
