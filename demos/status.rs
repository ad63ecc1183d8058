use nexia_web::NexiaClient;
use std::env;

/// usage: status <house_id> <login> <password> [thermostat] [--set <temp>] [--session <file>]
#[tokio::main]
async fn main() -> nexia_web::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let usage = "usage: status <house_id> <login> <password> [thermostat] [--set <temp>] [--session <file>]";
    let house_id: u64 = args
        .get(1)
        .and_then(|v| v.parse().ok())
        .expect(usage);
    let login = args.get(2).expect(usage);
    let password = args.get(3).expect(usage);
    let selector = args.get(4).filter(|a| !a.starts_with("--"));
    let flag = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
    };
    let new_temp: Option<f64> = flag("--set").and_then(|v| v.parse().ok());
    let session_file = flag("--session")
        .cloned()
        .unwrap_or_else(|| ".nexia-session.json".to_string());

    let mut client = NexiaClient::builder(house_id, login, password)
        .session_file(session_file)
        .build()?;

    for t in client.thermostats().await? {
        println!(
            "[{}] {} | mode: {} | temp: {} | setpoint: {}",
            t.id,
            t.name,
            t.operating_mode,
            t.temperature().map_or("-".to_string(), |v| format!("{v:.0}")),
            t.setpoint().map_or("-".to_string(), |v| format!("{v:.0}")),
        );
    }

    if let (Some(selector), Some(temp)) = (selector, new_temp) {
        let accepted = client.set_temperature(selector.as_str(), temp).await?;
        println!("set {selector} to {temp}: {}", if accepted { "ok" } else { "rejected" });
    }

    Ok(())
}
