use hidhub::{HidDevice, HidManager, ManagerConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _ = hidhub::logger::init_logging("warn");
    let manager = HidManager::new(ManagerConfig::default()).await;
    let metas: Vec<_> = manager
        .get_devices(&[])
        .await
        .iter()
        .map(|d| d.meta())
        .collect();
    match serde_json::to_string_pretty(&metas) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to encode device list: {e}"),
    }
}
