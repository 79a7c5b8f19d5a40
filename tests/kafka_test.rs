mod common;

use common::{get_test_kafka_config, sample_event, test_topic};
use event_bridge::kafka::{KafkaConnectionFactory, KafkaProducerBuilder};
use event_bridge::monitor::RecordingMonitor;
use event_bridge::unit_of_work::DefaultUnitOfWork;
use event_bridge::{
    ConfirmationMode, DefaultMessageConverter, DispatcherConfig, EventDispatcher, FactoryConfig,
    PublisherFactory,
};
use std::sync::Arc;
use std::time::Duration;

fn create_kafka_dispatcher(
    mode: ConfirmationMode,
    topic: &str,
    monitor: &RecordingMonitor,
) -> EventDispatcher<KafkaConnectionFactory, KafkaProducerBuilder> {
    let factory_config = FactoryConfig {
        confirmation_mode: mode,
        pool_capacity: 2,
        terminate_timeout: Duration::from_secs(5),
    };
    let factory = PublisherFactory::new(
        factory_config,
        KafkaConnectionFactory::new(get_test_kafka_config()),
        KafkaProducerBuilder::new(),
    )
    .unwrap();

    let config = DispatcherConfig {
        default_destination: topic.to_string(),
        ack_timeout: Duration::from_secs(10),
    };
    EventDispatcher::new(
        config,
        Arc::new(factory),
        DefaultMessageConverter::default(),
        monitor.clone(),
    )
    .unwrap()
}

#[tokio::test]
#[ignore] // Requires running Kafka
async fn test_send_in_every_confirmation_mode() {
    for mode in [
        ConfirmationMode::None,
        ConfirmationMode::AutoAck,
        ConfirmationMode::WaitForAck,
    ] {
        let topic = test_topic(&mode.to_string().to_lowercase());
        let monitor = RecordingMonitor::new();
        let dispatcher = create_kafka_dispatcher(mode, &topic, &monitor);
        let uow = DefaultUnitOfWork::new();

        dispatcher
            .send(&sample_event().with_aggregate("Order", "o-1", 1), &uow)
            .await
            .unwrap();
        uow.commit().await;
        dispatcher.shut_down().await;

        assert_eq!(monitor.successes(), 1, "mode {}", mode);
    }
}

#[tokio::test]
#[ignore] // Requires running Kafka
async fn test_wait_for_ack_reuses_pooled_producer() {
    let topic = test_topic("pooled");
    let monitor = RecordingMonitor::new();
    let dispatcher = create_kafka_dispatcher(ConfirmationMode::WaitForAck, &topic, &monitor);

    for _ in 0..3 {
        let uow = DefaultUnitOfWork::new();
        dispatcher.send(&sample_event(), &uow).await.unwrap();
        uow.commit().await;
    }

    assert_eq!(dispatcher.factory().idle_producers(), 1);
    dispatcher.shut_down().await;
    assert_eq!(dispatcher.factory().idle_producers(), 0);
}
