use std::time::Duration;

use btleplug::api::{Central as _, CentralEvent, CentralState, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, PeripheralId};
use futures::StreamExt as _;
use log::{debug, info, warn};
use tokio::time::{self, Instant};

use crate::advertiser::{AdvertiserStateMachine, HciAdvertiser, PowerState};
use crate::audio::{CueTable, ProcessCuePlayer};
use crate::beacon::{self, APPLE_COMPANY_ID, AdvertisingPayload, ProximityLevel, RegionFilter};
use crate::config::AppConfig;
use crate::messages::RegionEvent;
use crate::mqtt::{self, MqttClient, MqttDisplay};
use crate::presenter::ProximityPresenter;

const DEFAULT_EXIT_TIMEOUT_SECONDS: u64 = 30;

pub struct Manager {
    adapter: Adapter,
    mqtt_client: MqttClient,
    mqtt_event_loop: rumqttc::EventLoop,
    presenter: ProximityPresenter<MqttDisplay, ProcessCuePlayer>,
    filter: RegionFilter,
    channel: String,
    exit_timeout: Duration,
}

impl Manager {
    pub fn new(
        adapter: Adapter,
        mqtt_client: MqttClient,
        mqtt_event_loop: rumqttc::EventLoop,
        config: &AppConfig,
    ) -> Self {
        let display = MqttDisplay::new(mqtt_client.clone(), &config.beacon.name);
        let player = ProcessCuePlayer::new(&config.audio.player_command);
        let cues = CueTable::new(player, config.audio.sounds_dir.clone());

        Manager {
            adapter,
            mqtt_client,
            mqtt_event_loop,
            presenter: ProximityPresenter::new(display, cues),
            filter: RegionFilter::from_config(&config.beacon),
            channel: mqtt::sanitize_name(&config.beacon.name),
            exit_timeout: Duration::from_secs(
                config
                    .scan
                    .region_exit_timeout_seconds
                    .unwrap_or(DEFAULT_EXIT_TIMEOUT_SECONDS),
            ),
        }
    }

    pub async fn run_loop(self) -> anyhow::Result<()> {
        let Manager {
            adapter,
            mqtt_client,
            mqtt_event_loop,
            mut presenter,
            filter,
            channel,
            exit_timeout,
        } = self;

        adapter.start_scan(ScanFilter::default()).await?;
        info!("Ranging for beacon region {channel}");

        tokio::task::spawn(MqttClient::drive(mqtt_event_loop));

        handle_ranging_events(
            &adapter,
            &filter,
            &mut presenter,
            &mqtt_client,
            &channel,
            exit_timeout,
        )
        .await?;

        info!("Exiting manager event loop");
        mqtt_client.disconnect().await?;

        Ok(())
    }
}

async fn handle_ranging_events(
    adapter: &Adapter,
    filter: &RegionFilter,
    presenter: &mut ProximityPresenter<MqttDisplay, ProcessCuePlayer>,
    mqtt_client: &MqttClient,
    channel: &str,
    exit_timeout: Duration,
) -> anyhow::Result<()> {
    let mut events = adapter.events().await?;
    let mut in_region = false;
    let mut exit_deadline = Instant::now() + exit_timeout;

    loop {
        tokio::select! {
            event = events.next() => {
                match event {
                    Some(CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id)) => {
                        match sighting_level(adapter, filter, &id).await {
                            Ok(Some(level)) => {
                                if !in_region {
                                    in_region = true;
                                    announce_region_event(mqtt_client, channel, RegionEvent::Entered).await;
                                }
                                exit_deadline = Instant::now() + exit_timeout;
                                presenter.on_proximity_changed(level).await;
                            }
                            Ok(None) => {}
                            Err(err) => warn!("Failed to read advertisement: {err}"),
                        }
                    }
                    Some(CentralEvent::StateUpdate(state)) => {
                        debug!("Adapter state changed: {state:?}");
                    }
                    Some(_) => {}
                    None => {
                        info!("No more events");
                        break;
                    }
                }
            }
            _ = time::sleep_until(exit_deadline), if in_region => {
                in_region = false;
                announce_region_event(mqtt_client, channel, RegionEvent::Exited).await;
            }
        }
    }

    Ok(())
}

/// Classify one sighting, or None if it is not the tracked beacon.
async fn sighting_level(
    adapter: &Adapter,
    filter: &RegionFilter,
    id: &PeripheralId,
) -> Result<Option<ProximityLevel>, btleplug::Error> {
    let peripheral = adapter.peripheral(id).await?;
    let Some(properties) = peripheral.properties().await? else {
        return Ok(None);
    };
    if !filter.matches_address(&properties.address) {
        return Ok(None);
    }
    let Some(data) = properties.manufacturer_data.get(&APPLE_COMPANY_ID) else {
        return Ok(None);
    };
    let Some(frame) = beacon::parse_frame(data) else {
        return Ok(None);
    };
    if !filter.matches_frame(&frame) {
        return Ok(None);
    }
    Ok(Some(beacon::classify(properties.rssi, frame.measured_power)))
}

async fn announce_region_event(mqtt_client: &MqttClient, channel: &str, event: RegionEvent) {
    if let Err(err) = mqtt_client
        .announce_notification(channel, event.notification())
        .await
    {
        warn!("Failed to publish {event:?} notification: {err:?}");
    }
}

/// The beacon role: advertise the region identity while the controller is up.
pub async fn run_beacon_loop(adapter: Option<Adapter>, config: &AppConfig) -> anyhow::Result<()> {
    let payload = AdvertisingPayload::from_config(&config.beacon);
    let mut machine = AdvertiserStateMachine::new(HciAdvertiser::default(), payload);

    let Some(adapter) = adapter else {
        machine.on_power_state(PowerState::Unsupported).await;
        return Ok(());
    };

    let mut events = adapter.events().await?;

    // The adapter enumerated, so it is already up. BlueZ only reports
    // subsequent transitions on the event stream.
    machine.on_power_state(PowerState::PoweredOn).await;

    while let Some(event) = events.next().await {
        if let CentralEvent::StateUpdate(state) = event {
            debug!("Adapter state changed: {state:?}");
            machine.on_power_state(power_state_from(state)).await;
        }
    }

    machine.on_power_state(PowerState::PoweredOff).await;
    Ok(())
}

fn power_state_from(state: CentralState) -> PowerState {
    match state {
        CentralState::PoweredOn => PowerState::PoweredOn,
        CentralState::PoweredOff => PowerState::PoweredOff,
        _ => PowerState::Unknown,
    }
}
