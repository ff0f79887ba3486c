use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rehau_nea_smart::{Controller, MqttConfig, MqttTransport};
use serde_json::Value;

fn print_zones(controller: &Controller<MqttTransport>) {
    for installation in controller.get_installations() {
        println!(
            "[{}] mode: {:?} | outside: {} | {}",
            installation.unique,
            installation.operating_mode,
            installation.outside_temp,
            if installation.connected { "online" } else { "offline" },
        );
        for zone in installation.zones() {
            let temp = controller.get_temperature(&zone.id);
            let target = controller.get_target_temperature(&zone.id);
            let level = controller.get_energy_level(&zone.id);
            match (temp, target, level) {
                (Ok(temp), Ok(target), Ok(level)) => println!(
                    "  {} {:.1}\u{00b0}C -> {} | {:?}{}",
                    zone.name,
                    temp,
                    target.map_or("-".to_string(), |t| format!("{t:.1}\u{00b0}C")),
                    level,
                    match controller.get_humidity(&zone.id) {
                        Ok(Some(h)) => format!(" | {h:.0}%"),
                        _ => String::new(),
                    },
                ),
                _ => println!("  {} (no channels)", zone.name),
            }
        }
        let emu = controller.get_live_emu(&installation.unique);
        if let Some(supply) = emu.mixed_circuit1_supply {
            println!("  mixed circuit supply: {supply} | pump: {:?}", emu.pump_on);
        }
    }
}

#[tokio::main]
async fn main() -> rehau_nea_smart::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let host = args.get(1).expect("usage: monitor <host> <unique> [snapshot.json]");
    let unique = args.get(2).expect("usage: monitor <host> <unique> [snapshot.json]");

    let mut config = MqttConfig::new(host, 1883);
    if let (Ok(user), Ok(pass)) = (env::var("REHAU_USER"), env::var("REHAU_PASSWORD")) {
        config = config.credentials(user, pass);
    }

    let changed = Arc::new(AtomicBool::new(false));
    let flag = changed.clone();
    let (transport, mut session) = config.connect();
    let mut controller = Controller::builder(transport)
        .on_change(move || flag.store(true, Ordering::Relaxed))
        .build()?;

    if let Some(path) = args.get(3) {
        let text = std::fs::read_to_string(path)?;
        let documents: Vec<Value> = serde_json::from_str(&text)?;
        controller.load_installations(&documents)?;
    }

    println!("Connecting to {host}...");
    session.subscribe(unique).await?;

    loop {
        match session.next_message().await {
            Ok(message) => {
                if let Err(e) = controller.handle(&message) {
                    eprintln!("{}: {e}", message.topic);
                }
                if changed.swap(false, Ordering::Relaxed) {
                    print_zones(&controller);
                }
            }
            Err(e) => {
                eprintln!("Connection error: {e}");
                controller.reset();
                tokio::time::sleep(Duration::from_secs(5)).await;
                println!("Reconnecting...");
                session.subscribe(unique).await?;
            }
        }
    }
}
