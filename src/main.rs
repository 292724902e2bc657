use anyhow::Context;
use mailroom_realtime::{
    client::Client,
    configuration::get_configuration,
    service::{
        badge_service::{BadgeAggregator, HttpNotificationApi},
        notification::NotificationService,
        registry::EventRegistry,
    },
    state::{route::CurrentRoute, token::MemoryTokenStore},
    telemetry::{get_subscriber, init_subscriber},
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber("mailroom-listener".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber)?;

    let configuration = get_configuration().context("Failed to read configuration")?;
    let tokens = MemoryTokenStore::new(configuration.token());

    let registry = Arc::new(EventRegistry::new());
    let client = Arc::new(Client::new(
        configuration.connect_options(),
        &tokens,
        registry.clone(),
    )?);

    let (toast_tx, mut toast_rx) = mpsc::unbounded_channel();
    let notifications = Arc::new(NotificationService::new(
        CurrentRoute::new(configuration.initial_route.clone()),
        configuration.chat_route.clone(),
        configuration.notification_window,
        toast_tx,
    ));
    let _notification_subs = notifications.subscribe(&registry);
    let _error_sub = registry.on_errors(|error| {
        tracing::warn!(message = %error.message, code = ?error.code, "Server reported an error");
    });

    let api = HttpNotificationApi::new(
        &configuration.api_url,
        &configuration.count_path,
        &configuration.list_path,
        configuration.token(),
    )?;
    let aggregator = Arc::new(BadgeAggregator::new(
        Arc::new(api),
        configuration.poll_interval(),
    ));
    aggregator.set_responsibilities(configuration.responsibility_ids()?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let client_task = tokio::spawn(client.clone().run(shutdown_rx.clone()));

    let aggregator_c = aggregator.clone();
    let badge_shutdown = shutdown_rx.clone();
    let badge_task = tokio::spawn(async move { aggregator_c.run(badge_shutdown).await });

    tokio::spawn(async move {
        while let Some(toast) = toast_rx.recv().await {
            tracing::info!(
                message_id = %toast.message_id,
                title = %toast.title,
                body = %toast.body,
                "New message"
            );
        }
    });

    let mut badge = aggregator.subscribe();
    tokio::spawn(async move {
        while badge.changed().await.is_ok() {
            let total = badge.borrow_and_update().total;
            tracing::info!(total, "Unread notifications");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);

    badge_task.await?;
    client_task.await??;
    Ok(())
}
