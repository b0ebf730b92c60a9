use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use taskpool_core::TaskState;

/// Prometheus metrics for the worker pool
pub struct PoolMetrics {
    pub registry: Registry,

    // Admission
    pub tasks_enqueued: IntCounter,
    pub tasks_rejected: IntCounter,

    // Outcomes
    pub tasks_finished: IntCounterVec,
    pub task_retries: IntCounter,
    pub task_panics: IntCounter,

    // Gauges
    pub tasks_in_flight: IntGauge,
    pub queue_depth: IntGauge,

    pub attempt_duration: Histogram,
}

impl PoolMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let tasks_enqueued = IntCounter::new(
            "taskpool_tasks_enqueued_total",
            "Tasks admitted into the intake queue",
        )?;
        registry.register(Box::new(tasks_enqueued.clone()))?;

        let tasks_rejected = IntCounter::new(
            "taskpool_tasks_rejected_total",
            "Tasks rejected because the intake queue was full",
        )?;
        registry.register(Box::new(tasks_rejected.clone()))?;

        let tasks_finished = IntCounterVec::new(
            Opts::new("taskpool_tasks_finished_total", "Tasks that reached a terminal state"),
            &["state"],
        )?;
        registry.register(Box::new(tasks_finished.clone()))?;

        let task_retries = IntCounter::new(
            "taskpool_task_retries_total",
            "Failed attempts handed to the retry scheduler",
        )?;
        registry.register(Box::new(task_retries.clone()))?;

        let task_panics = IntCounter::new(
            "taskpool_task_panics_total",
            "Attempts that ended in a panic",
        )?;
        registry.register(Box::new(task_panics.clone()))?;

        let tasks_in_flight = IntGauge::new(
            "taskpool_tasks_in_flight",
            "Attempts currently executing",
        )?;
        registry.register(Box::new(tasks_in_flight.clone()))?;

        let queue_depth = IntGauge::new(
            "taskpool_queue_depth",
            "Tasks waiting in the intake queue",
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        let attempt_duration = Histogram::with_opts(HistogramOpts::new(
            "taskpool_attempt_duration_seconds",
            "Duration of a single execution attempt in seconds",
        ))?;
        registry.register(Box::new(attempt_duration.clone()))?;

        Ok(PoolMetrics {
            registry,
            tasks_enqueued,
            tasks_rejected,
            tasks_finished,
            task_retries,
            task_panics,
            tasks_in_flight,
            queue_depth,
            attempt_duration,
        })
    }

    /// Count a task reaching `state`
    pub fn inc_finished(&self, state: TaskState) {
        self.tasks_finished.with_label_values(&[state.as_str()]).inc();
    }

    /// Render the registry in the Prometheus text format
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
