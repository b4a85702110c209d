use optica::config::get_configuration;
use optica::startup::Application;
use optica::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber("optica".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber);

    let config = get_configuration()?;

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
