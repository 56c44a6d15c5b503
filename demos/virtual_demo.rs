use hidhub::backends::virtual_input::VirtualTransport;
use hidhub::{logger, DeviceMeta, HidManager, ManagerConfig};
use std::time::Duration;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _ = logger::init_logging("hidhub=debug,info");

    // A host with one gamepad plugged in
    let host = VirtualTransport::new();
    let pad = host.add_device(
        "virtual:pad",
        DeviceMeta {
            bus: Some("virtual".into()),
            vid: Some(0x046d),
            pid: Some(0xc216),
            product_string: Some("Demo Gamepad".into()),
            ..Default::default()
        },
    );
    pad.set_feature_report(0x02, vec![0x10, 0x20]);

    let manager = HidManager::with_transport(host.clone(), ManagerConfig::default()).await;
    logger::log_connections(&manager);

    let Some(device) = manager.request_device(&[]).await else {
        eprintln!("no device");
        return;
    };
    manager.on_input_report(&device, |data, report_id, dev, _| {
        println!("(Virtual) {} report {:?}: {:02x?}", dev.id(), report_id, data.as_bytes());
    });

    pad.emit_input_report(Some(1), vec![0x01, 0x7f]);
    manager.send_report(&device, 0x01, [0xffu8, 0x00]).await;
    if let Some(feature) = manager.receive_feature_report(&device, 0x02).await {
        println!("(Virtual) feature 0x02 = {:02x?}", feature.as_bytes());
    }

    host.disconnect(&pad);
    tokio::time::sleep(Duration::from_millis(20)).await;
    manager.close_device(&device).await;

    for call in host.calls() {
        println!("(Virtual) transport call: {call:?}");
    }
}
