use eggkit::{
    init_logging, list_ports, ConnectOptions, FirmwareVersion, PlotterController, SerialOptions,
};

/// Console entry point: enumerate candidate ports and, when
/// `EGGKIT_PORT` names one, connect and report the firmware version.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    println!("Build: {}", env!("BUILD_DATE"));

    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No candidate serial ports found.");
    }
    for port in &ports {
        let marker = if port.is_ebb() { " [EBB]" } else { "" };
        println!("{}  {}{}", port.port_name, port.description, marker);
    }

    let Ok(port) = std::env::var("EGGKIT_PORT") else {
        println!("Set EGGKIT_PORT to connect.");
        return Ok(());
    };

    let controller = PlotterController::new();
    let banner = controller
        .connect(&ConnectOptions::Serial(SerialOptions::new(&port)))
        .await?;
    match FirmwareVersion::parse(&banner) {
        Some(version) => println!("Connected to {port}: firmware {version}"),
        None => println!("Connected to {port}: {banner}"),
    }

    controller.disconnect().await?;
    Ok(())
}
