//! Factory CCU: pairing, layout and calibration control over MQTT.

mod mqtt;
mod router;
mod sync;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use ccu_calibration::CalibrationCoordinator;
use ccu_core::bus::SharedPublisher;
use ccu_core::config::defaults;
use ccu_core::{CcuConfig, EventBus, ModuleType, RecordingPublisher};
use ccu_devices::{PairedDevice, PairingRegistry, PairingStatePublisher};
use ccu_topology::{JsonFileLayoutStore, Topology, TopologyGraph};

use crate::mqtt::MqttBus;
use crate::router::Router;
use crate::sync::LayoutSync;

/// Central control unit of the learning factory.
#[derive(Parser, Debug)]
#[command(name = "ccu")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file.
    #[arg(short, long, env = "CCU_CONFIG", default_value = defaults::CONFIG_PATH)]
    config: PathBuf,

    /// Load everything, print what would be published and exit.
    #[arg(long)]
    dry_run: bool,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,
}

const CRATE_TARGETS: &[&str] = &[
    "ccu",
    "ccu_core",
    "ccu_devices",
    "ccu_topology",
    "ccu_calibration",
];

fn init_logging(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives: Vec<String> = CRATE_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, level))
            .chain(std::iter::once("rumqttc=warn".to_string()))
            .collect();
        tracing_subscriber::EnvFilter::new(directives.join(","))
    });

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = CcuConfig::resolve(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;

    init_logging(args.verbose, config.logging.json);

    info!(
        config = %args.config.display(),
        broker = %format!("{}:{}", config.mqtt.host, config.mqtt.port),
        layout = %config.layout.path,
        dry_run = args.dry_run,
        "Starting CCU"
    );

    if args.dry_run {
        let recorder = Arc::new(RecordingPublisher::new());
        let ccu = Ccu::build(&config, recorder.clone()).await?;
        ccu.publish_initial_state().await;
        for message in recorder.messages() {
            println!(
                "{} (retain={}): {}",
                message.topic, message.options.retain, message.body
            );
        }
        return Ok(());
    }

    let (bus, eventloop) = MqttBus::connect(&config.mqtt);
    let ccu = Ccu::build(&config, Arc::new(bus.clone())).await?;
    ccu.spawn_background_tasks();
    ccu.publish_initial_state().await;

    let router = Arc::new(Router::new(
        ccu.modules.clone(),
        ccu.agvs.clone(),
        ccu.topology.clone(),
        ccu.calibration.clone(),
    ));
    let (inbound, _worker) = router.spawn_worker();

    tokio::select! {
        _ = mqtt::run_event_loop(eventloop, bus.clone(), inbound) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutting down");
        }
    }

    bus.disconnect().await;
    Ok(())
}

/// The wired-up CCU components.
struct Ccu {
    event_bus: Arc<EventBus>,
    modules: Arc<PairingRegistry>,
    agvs: Arc<PairingRegistry>,
    pairing_state: Arc<PairingStatePublisher>,
    topology: Arc<Topology>,
    layout_sync: Arc<LayoutSync>,
    calibration: Arc<CalibrationCoordinator>,
}

impl Ccu {
    async fn build(config: &CcuConfig, publisher: SharedPublisher) -> Result<Self> {
        let event_bus = Arc::new(EventBus::new());

        let modules = Arc::new(PairingRegistry::for_modules(
            &config.pairing,
            publisher.clone(),
            event_bus.clone(),
        ));
        let agvs = Arc::new(PairingRegistry::for_agvs(
            &config.pairing,
            publisher.clone(),
            event_bus.clone(),
        ));
        let fleet: Vec<PairedDevice> = config
            .pairing
            .agvs
            .iter()
            .map(|serial| PairedDevice::new(serial.clone(), ModuleType::Fts))
            .collect();
        agvs.set_paired_devices(&fleet).await;

        let pairing_state = Arc::new(PairingStatePublisher::new(
            modules.clone(),
            agvs.clone(),
            publisher.clone(),
        ));

        let topology = Arc::new(Topology::new(
            Arc::new(TopologyGraph::new()),
            Arc::new(JsonFileLayoutStore::new(&config.layout.path)),
            event_bus.clone(),
        ));
        let layout_sync = Arc::new(LayoutSync::new(
            topology.clone(),
            modules.clone(),
            publisher.clone(),
        ));
        if !topology
            .reload_from_storage()
            .context("loading stored layout")?
        {
            warn!(path = %config.layout.path, "No stored layout, starting empty");
        }

        let calibration = Arc::new(CalibrationCoordinator::new(modules.clone(), publisher));

        Ok(Self {
            event_bus,
            modules,
            agvs,
            pairing_state,
            topology,
            layout_sync,
            calibration,
        })
    }

    fn spawn_background_tasks(&self) {
        tokio::spawn(
            self.pairing_state
                .clone()
                .run(self.event_bus.pairing_events()),
        );
        tokio::spawn(self.layout_sync.clone().run(self.event_bus.layout_events()));
    }

    /// Pair the stored layout's modules and publish the retained views.
    async fn publish_initial_state(&self) {
        if let Err(e) = self.layout_sync.apply().await {
            warn!(error = %e, "Failed to apply stored layout");
        }
        if let Err(e) = self.pairing_state.publish_now().await {
            warn!(error = %e, "Failed to publish pairing state");
        }
    }
}
