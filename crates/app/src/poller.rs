//! Metric pollers: one periodic task per (device, metric).
//!
//! Each task reads its metric at a fixed interval and publishes the
//! rendered value under the device's topic base. Ticks are scheduled on an
//! absolute timeline so slow reads do not accumulate drift, and the first
//! reading happens one interval after start.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use linkbridge_domain::error::BridgeError;
use linkbridge_domain::metric::{self, MetricKind, PublishFormat};

use crate::ports::{BusPublisher, DeviceTransport};
use crate::registry::{DeviceRegistry, ManagedDevice};

/// Which metrics to poll and how often.
#[derive(Debug, Clone, Default)]
pub struct PollPlan {
    intervals: BTreeMap<MetricKind, Duration>,
    json: BTreeSet<MetricKind>,
}

impl PollPlan {
    /// Poll `metric` every `interval`. A zero interval disables the metric.
    #[must_use]
    pub fn every(mut self, metric: MetricKind, interval: Duration) -> Self {
        if interval.is_zero() {
            self.intervals.remove(&metric);
        } else {
            self.intervals.insert(metric, interval);
        }
        self
    }

    /// Publish `metric` as one JSON document instead of one topic per leaf.
    #[must_use]
    pub fn json(mut self, metric: MetricKind) -> Self {
        self.json.insert(metric);
        self
    }

    /// Interval configured for `metric`, if it is polled.
    pub fn interval(&self, metric: MetricKind) -> Option<Duration> {
        self.intervals.get(&metric).copied()
    }

    /// One job per device and supported, enabled metric.
    pub fn jobs<D>(&self, registry: &DeviceRegistry<D>) -> Vec<PollJob<D>> {
        registry
            .devices()
            .iter()
            .flat_map(|device| {
                device
                    .handle()
                    .capabilities()
                    .metrics
                    .iter()
                    .filter_map(move |metric| {
                        let interval = self.interval(*metric)?;
                        let format = if self.json.contains(metric) {
                            PublishFormat::Json
                        } else {
                            PublishFormat::Leaves
                        };
                        Some(PollJob {
                            device: device.clone(),
                            metric: *metric,
                            interval,
                            format,
                        })
                    })
            })
            .collect()
    }
}

/// A single periodic reading.
pub struct PollJob<D> {
    device: ManagedDevice<D>,
    metric: MetricKind,
    interval: Duration,
    format: PublishFormat,
}

impl<D: DeviceTransport> PollJob<D> {
    /// Metric read by this job.
    pub fn metric(&self) -> MetricKind {
        self.metric
    }

    /// Read the metric once and publish it.
    ///
    /// Returns the number of messages published.
    ///
    /// # Errors
    ///
    /// Returns the device error if the reading fails, or the last publish
    /// error. Every rendered message is attempted even when one fails.
    pub async fn fire<P: BusPublisher>(&self, publisher: &P) -> Result<usize, BridgeError> {
        let value = self.device.transport().read_metric(self.metric).await?;

        let mut published = 0;
        let mut failure = None;
        for message in metric::render(self.metric, &value, self.format) {
            let topic = self.device.topic(&message.suffix);
            match publisher.publish(&topic, message.payload).await {
                Ok(()) => published += 1,
                Err(err) => failure = Some(err),
            }
        }
        failure.map_or(Ok(published), Err)
    }

    async fn run<P: BusPublisher>(self, publisher: P) {
        let Some(start) = Instant::now().checked_add(self.interval) else {
            tracing::warn!(
                device = %self.device.handle(),
                metric = self.metric.topic(),
                "poll interval out of range, poller idle"
            );
            return;
        };
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.fire(&publisher).await {
                Ok(published) => tracing::trace!(
                    device = %self.device.handle(),
                    metric = self.metric.topic(),
                    published,
                    "metric polled"
                ),
                Err(err) => tracing::warn!(
                    device = %self.device.handle(),
                    metric = self.metric.topic(),
                    error = ?err,
                    "metric poll failed"
                ),
            }
        }
    }
}

/// Running pollers. Dropping the set leaves the tasks running; call
/// [`shutdown`](Self::shutdown) to stop them.
#[derive(Debug, Default)]
pub struct PollerSet {
    handles: Vec<JoinHandle<()>>,
}

impl PollerSet {
    /// Spawn one task per job.
    pub fn start<D, P>(jobs: Vec<PollJob<D>>, publisher: &P) -> Self
    where
        D: DeviceTransport + 'static,
        P: BusPublisher,
    {
        let handles = jobs
            .into_iter()
            .map(|job| {
                tracing::debug!(
                    device = %job.device.handle(),
                    metric = job.metric.topic(),
                    interval_secs = job.interval.as_secs_f64(),
                    "poller started"
                );
                tokio::spawn(job.run(publisher.clone()))
            })
            .collect();
        Self { handles }
    }

    /// Number of running pollers.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no poller is running.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop every poller.
    pub fn shutdown(self) {
        for handle in &self.handles {
            handle.abort();
        }
        tracing::debug!(count = self.handles.len(), "pollers stopped");
    }
}

#[cfg(test)]
mod tests {
    use linkbridge_domain::device::{DeviceHandle, DeviceKind, MacAddress};

    use super::*;
    use crate::testing::{Call, FakeDevice, RecordingPublisher};

    fn handle(kind: DeviceKind, last: u8) -> DeviceHandle {
        DeviceHandle::new(kind, "10.0.0.1", MacAddress::new([0, 0, 0, 0, 0, last]))
    }

    fn plan() -> PollPlan {
        PollPlan::default()
            .every(MetricKind::Temperature, Duration::from_secs(10))
            .every(MetricKind::Humidity, Duration::from_secs(30))
            .every(MetricKind::Sensors, Duration::from_secs(10))
            .every(MetricKind::State, Duration::from_secs(10))
    }

    fn readings(device: &FakeDevice, metric: MetricKind) -> usize {
        device
            .calls()
            .iter()
            .filter(|c| **c == Call::ReadMetric(metric))
            .count()
    }

    #[test]
    fn should_create_jobs_for_supported_enabled_metrics_only() {
        let mut registry = DeviceRegistry::multiple("broadlink/", "all/");
        registry.register("rm/", handle(DeviceKind::Rm4, 1), ()).unwrap();
        registry.register("sp/", handle(DeviceKind::Sp1, 2), ()).unwrap();
        registry.register("dooya/", handle(DeviceKind::Dooya, 3), ()).unwrap();

        let jobs = plan().jobs(&registry);

        let metrics: Vec<_> = jobs.iter().map(|job| job.metric).collect();
        assert_eq!(metrics, vec![MetricKind::Temperature, MetricKind::Humidity]);
    }

    #[test]
    fn should_disable_metric_with_zero_interval() {
        let plan = plan().every(MetricKind::Temperature, Duration::ZERO);
        assert_eq!(plan.interval(MetricKind::Temperature), None);
    }

    #[tokio::test]
    async fn should_publish_scalar_under_device_topic() {
        let registry = DeviceRegistry::single("broadlink/", handle(DeviceKind::Rm, 1), FakeDevice::default());
        let publisher = RecordingPublisher::default();
        let jobs = plan().jobs(&registry);

        let published = jobs[0].fire(&publisher).await.unwrap();

        assert_eq!(published, 1);
        assert_eq!(
            publisher.messages(),
            vec![("broadlink/temperature".to_string(), "23.5".to_string())]
        );
    }

    #[tokio::test]
    async fn should_publish_one_topic_per_leaf() {
        let registry = DeviceRegistry::single("broadlink/", handle(DeviceKind::A1, 1), FakeDevice::default());
        let publisher = RecordingPublisher::default();
        let jobs = plan().jobs(&registry);

        jobs[0].fire(&publisher).await.unwrap();

        assert_eq!(
            publisher.messages(),
            vec![
                ("broadlink/sensor/humidity".to_string(), "36".to_string()),
                ("broadlink/sensor/light".to_string(), "dim".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn should_publish_json_document_when_configured() {
        let registry = DeviceRegistry::single("broadlink/", handle(DeviceKind::Mp1, 1), FakeDevice::default());
        let publisher = RecordingPublisher::default();
        let jobs = plan().json(MetricKind::State).jobs(&registry);

        jobs[0].fire(&publisher).await.unwrap();

        assert_eq!(
            publisher.messages(),
            vec![(
                "broadlink/state".to_string(),
                r#"{"s1":true,"s2":false}"#.to_string()
            )]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_poll_on_fixed_interval_after_first_period() {
        let registry = DeviceRegistry::single("broadlink/", handle(DeviceKind::Rm4, 1), FakeDevice::default());
        let publisher = RecordingPublisher::default();
        let pollers = PollerSet::start(plan().jobs(&registry), &publisher);
        assert_eq!(pollers.len(), 2);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(publisher.messages().is_empty());

        tokio::time::sleep(Duration::from_secs(30)).await;
        let device = registry.devices()[0].transport();
        assert_eq!(readings(device, MetricKind::Temperature), 3);
        assert_eq!(readings(device, MetricKind::Humidity), 1);

        pollers.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_polling_after_device_failures() {
        let registry = DeviceRegistry::single("broadlink/", handle(DeviceKind::Rm, 1), FakeDevice::failing());
        let publisher = RecordingPublisher::default();
        let pollers = PollerSet::start(plan().jobs(&registry), &publisher);

        tokio::time::sleep(Duration::from_secs(25)).await;

        let device = registry.devices()[0].transport();
        assert_eq!(readings(device, MetricKind::Temperature), 2);
        assert!(publisher.messages().is_empty());
        pollers.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_polling_while_bus_is_down() {
        let registry = DeviceRegistry::single("broadlink/", handle(DeviceKind::Rm, 1), FakeDevice::default());
        let publisher = RecordingPublisher::disconnected();
        let pollers = PollerSet::start(plan().jobs(&registry), &publisher);

        tokio::time::sleep(Duration::from_secs(25)).await;

        let device = registry.devices()[0].transport();
        assert_eq!(readings(device, MetricKind::Temperature), 2);
        pollers.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn should_idle_when_interval_is_out_of_range() {
        let registry = DeviceRegistry::single("broadlink/", handle(DeviceKind::Rm, 1), FakeDevice::default());
        let publisher = RecordingPublisher::default();
        let plan = PollPlan::default().every(MetricKind::Temperature, Duration::MAX);
        let job = plan.jobs(&registry).into_iter().next().unwrap();

        job.run(publisher.clone()).await;

        assert_eq!(readings(registry.devices()[0].transport(), MetricKind::Temperature), 0);
        assert!(publisher.messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_stop_polling_on_shutdown() {
        let registry = DeviceRegistry::single("broadlink/", handle(DeviceKind::Rm, 1), FakeDevice::default());
        let publisher = RecordingPublisher::default();
        let pollers = PollerSet::start(plan().jobs(&registry), &publisher);

        tokio::time::sleep(Duration::from_secs(15)).await;
        pollers.shutdown();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(readings(registry.devices()[0].transport(), MetricKind::Temperature), 1);
    }
}
