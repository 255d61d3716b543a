use std::time::Duration;

use blynk_link::{color, Client, Config, HandlerRegistry};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Config file from the first argument, otherwise a token from the environment
    let config = match std::env::args().nth(1) {
        Some(path) => match Config::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Cannot load {}: {}", path, e);
                return;
            }
        },
        None => match std::env::var("BLYNK_AUTH") {
            Ok(token) => Config::new(token),
            Err(_) => {
                eprintln!("Usage: device <config.toml> (or set BLYNK_AUTH)");
                return;
            }
        },
    };

    let mut handlers = HandlerRegistry::new();
    handlers.on_connected(|link, latency| {
        println!("Connected, login took {:?}", latency);
        link.set_property(1, "color", [color::GREEN])?;
        link.sync_virtual([0, 1])?;
        Ok(())
    });
    handlers.on_disconnected(|| {
        println!("Disconnected");
        Ok(())
    });
    handlers.on_virtual_write(0, |link, values| {
        println!("V0 <- {:?}", values);
        let on = values.first().map(|v| v == "1").unwrap_or(false);
        link.set_property(1, "color", [if on { color::RED } else { color::GREEN }])?;
        Ok(())
    });
    handlers.on_any_virtual_read(|link, pin| {
        println!("App reads V{}", pin);
        link.virtual_write(pin, [42])?;
        Ok(())
    });

    let mut client = match Client::from_config(config, handlers) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return;
        }
    };

    // Uptime counter pushed from outside the handlers
    let handle = client.handle();
    tokio::spawn(async move {
        let mut seconds = 0u64;
        loop {
            sleep(Duration::from_secs(5)).await;
            seconds += 5;
            let _ = handle.virtual_write(2, [seconds]);
        }
    });

    // Reconnecting is the caller's job
    loop {
        match client.open().await {
            Ok(_) => {
                if let Err(e) = client.run().await {
                    eprintln!("Connection lost: {}", e);
                }
            }
            Err(e) if e.is_fatal() => {
                eprintln!("Giving up: {}", e);
                return;
            }
            Err(e) => eprintln!("Connect failed: {}", e),
        }
        sleep(Duration::from_secs(5)).await;
    }
}
