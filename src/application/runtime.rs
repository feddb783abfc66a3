// Controller runtime - drives the chart controller from commands, completions and timers
use crate::application::controller::{ChartController, ChartSnapshot, ControllerError, SeriesOptions};
use crate::application::worker::{FetchCompletion, FetchPool};
use crate::domain::sample::Sample;
use crate::domain::statistics::SeriesStatistics;
use crate::domain::viewport::Viewport;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

const COMMAND_BUFFER: usize = 256;

type Reply<T> = oneshot::Sender<Result<T, ControllerError>>;

#[derive(Debug)]
enum Command {
    AddSeries {
        name: String,
        options: SeriesOptions,
        reply: Reply<()>,
    },
    RemoveSeries {
        name: String,
        reply: Reply<()>,
    },
    SetArchived {
        name: String,
        enabled: bool,
        reply: Reply<()>,
    },
    LiveSample {
        name: String,
        sample: Sample,
        reply: Reply<()>,
    },
    ViewportChanged {
        viewport: Viewport,
    },
    SetTimeRange {
        viewport: Viewport,
    },
    Statistics {
        reply: oneshot::Sender<Vec<SeriesStatistics>>,
    },
    Snapshot {
        reply: oneshot::Sender<ChartSnapshot>,
    },
    Shutdown,
}

/// Cloneable handle to the controller task.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
}

impl ControllerHandle {
    async fn send(&self, command: Command) -> Result<(), ControllerError> {
        self.commands.send(command).await.map_err(|_| ControllerError::Stopped)
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, ControllerError> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        rx.await.map_err(|_| ControllerError::Stopped)?
    }

    pub async fn add_series(&self, name: &str, options: SeriesOptions) -> Result<(), ControllerError> {
        let name = name.to_string();
        self.request(|reply| Command::AddSeries { name, options, reply }).await
    }

    pub async fn remove_series(&self, name: &str) -> Result<(), ControllerError> {
        let name = name.to_string();
        self.request(|reply| Command::RemoveSeries { name, reply }).await
    }

    pub async fn set_archived(&self, name: &str, enabled: bool) -> Result<(), ControllerError> {
        let name = name.to_string();
        self.request(|reply| Command::SetArchived { name, enabled, reply })
            .await
    }

    pub async fn push_live_sample(&self, name: &str, sample: Sample) -> Result<(), ControllerError> {
        let name = name.to_string();
        self.request(|reply| Command::LiveSample { name, sample, reply }).await
    }

    pub async fn viewport_changed(&self, viewport: Viewport) -> Result<(), ControllerError> {
        self.send(Command::ViewportChanged { viewport }).await
    }

    pub async fn set_time_range(&self, viewport: Viewport) -> Result<(), ControllerError> {
        self.send(Command::SetTimeRange { viewport }).await
    }

    /// Computes statistics now, publishing them as an event as well.
    pub async fn statistics(&self) -> Result<Vec<SeriesStatistics>, ControllerError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Statistics { reply: tx }).await?;
        rx.await.map_err(|_| ControllerError::Stopped)
    }

    pub async fn snapshot(&self) -> Result<ChartSnapshot, ControllerError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply: tx }).await?;
        rx.await.map_err(|_| ControllerError::Stopped)
    }

    pub async fn shutdown(&self) -> Result<(), ControllerError> {
        self.send(Command::Shutdown).await
    }
}

/// Moves `controller` onto its own task. The task ends on [`ControllerHandle::shutdown`]
/// or once every handle is dropped.
pub fn spawn_controller(
    controller: ChartController,
    pool: FetchPool,
    completions: mpsc::UnboundedReceiver<FetchCompletion>,
    statistics_interval: Option<Duration>,
) -> (ControllerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let task = tokio::spawn(run(controller, pool, rx, completions, statistics_interval));
    (ControllerHandle { commands: tx }, task)
}

async fn run(
    mut controller: ChartController,
    pool: FetchPool,
    mut commands: mpsc::Receiver<Command>,
    mut completions: mpsc::UnboundedReceiver<FetchCompletion>,
    statistics_interval: Option<Duration>,
) {
    let mut statistics_timer = statistics_interval.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    });

    loop {
        let deadline = controller.next_deadline();

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Shutdown) | None => {
                    controller.shutdown();
                    break;
                }
                Some(command) => handle_command(&mut controller, &pool, command),
            },
            Some(completion) = completions.recv() => controller.on_fetch_completed(completion),
            _ = sleep_until(deadline) => controller.on_tick(Instant::now()),
            _ = tick(&mut statistics_timer) => refresh_statistics(&controller, &pool, None),
        }

        for job in controller.drain_jobs() {
            pool.submit(job);
        }
    }
}

fn handle_command(controller: &mut ChartController, pool: &FetchPool, command: Command) {
    match command {
        Command::AddSeries { name, options, reply } => {
            let _ = reply.send(controller.add_series(&name, options));
        }
        Command::RemoveSeries { name, reply } => {
            let _ = reply.send(controller.remove_series(&name));
        }
        Command::SetArchived { name, enabled, reply } => {
            let _ = reply.send(controller.set_archived(&name, enabled));
        }
        Command::LiveSample { name, sample, reply } => {
            let _ = reply.send(controller.push_live_sample(&name, sample));
        }
        Command::ViewportChanged { viewport } => controller.viewport_changed(viewport, Instant::now()),
        Command::SetTimeRange { viewport } => controller.set_time_range(viewport, Instant::now()),
        Command::Statistics { reply } => refresh_statistics(controller, pool, Some(reply)),
        Command::Snapshot { reply } => {
            let _ = reply.send(controller.snapshot());
        }
        Command::Shutdown => {}
    }
}

fn refresh_statistics(
    controller: &ChartController,
    pool: &FetchPool,
    reply: Option<oneshot::Sender<Vec<SeriesStatistics>>>,
) {
    let viewport = controller.viewport();
    pool.spawn_statistics(
        controller.live_statistics(),
        controller.statistics_targets(),
        (viewport.start_ms(), viewport.end_ms()),
        controller.sink(),
        reply,
    );
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
