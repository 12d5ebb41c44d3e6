use std::process::Stdio;

use anyhow::Context as _;
use log::{info, warn};
use tokio::process::Command;

use crate::beacon::AdvertisingPayload;

/// Power transitions reported by the Bluetooth stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    /// The controller cannot advertise at all.
    Unsupported,
    /// Anything the stack reports that we do not recognize.
    Unknown,
}

#[allow(async_fn_in_trait)]
pub trait Advertiser {
    async fn start_advertising(&mut self, payload: &AdvertisingPayload) -> anyhow::Result<()>;

    async fn stop_advertising(&mut self) -> anyhow::Result<()>;
}

/// Starts and stops beacon advertising as the controller powers up and down.
///
/// Purely reactive: no timers, no retries. Unrecognized states are ignored.
pub struct AdvertiserStateMachine<A> {
    advertiser: A,
    payload: AdvertisingPayload,
    advertising: bool,
    reported_unsupported: bool,
}

impl<A: Advertiser> AdvertiserStateMachine<A> {
    pub fn new(advertiser: A, payload: AdvertisingPayload) -> Self {
        AdvertiserStateMachine {
            advertiser,
            payload,
            advertising: false,
            reported_unsupported: false,
        }
    }

    pub async fn on_power_state(&mut self, state: PowerState) {
        match state {
            PowerState::PoweredOn => {
                if self.advertising {
                    return;
                }
                info!("Bluetooth powered on, starting beacon advertising");
                match self.advertiser.start_advertising(&self.payload).await {
                    Ok(()) => self.advertising = true,
                    Err(err) => warn!("Failed to start advertising: {err:#}"),
                }
            }
            PowerState::PoweredOff => {
                if !self.advertising {
                    return;
                }
                info!("Bluetooth powered off, stopping beacon advertising");
                if let Err(err) = self.advertiser.stop_advertising().await {
                    warn!("Failed to stop advertising: {err:#}");
                }
                self.advertising = false;
            }
            PowerState::Unsupported => {
                if !self.reported_unsupported {
                    warn!("Beacon advertising is not supported on this host");
                    self.reported_unsupported = true;
                }
            }
            PowerState::Unknown => {}
        }
    }
}

const OGF_LE: &str = "0x08";
const OCF_SET_ADVERTISING_DATA: &str = "0x0008";
const OCF_SET_ADVERTISE_ENABLE: &str = "0x000a";

/// Drives the controller's LE advertising registers through hcitool.
///
/// btleplug only exposes the central role, so the peripheral side goes
/// straight to the BlueZ command channel.
#[derive(Debug, Default)]
pub struct HciAdvertiser {
    device: Option<String>,
}

impl HciAdvertiser {
    async fn hci_cmd(&self, ocf: &str, octets: &[u8]) -> anyhow::Result<()> {
        let mut command = Command::new("hcitool");
        if let Some(device) = &self.device {
            command.args(["-i", device]);
        }
        command.args(["cmd", OGF_LE, ocf]);
        for octet in octets {
            command.arg(format!("{octet:02x}"));
        }
        let status = command
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .context("running hcitool")?;
        anyhow::ensure!(status.success(), "hcitool {ocf} exited with {status}");
        Ok(())
    }
}

impl Advertiser for HciAdvertiser {
    async fn start_advertising(&mut self, payload: &AdvertisingPayload) -> anyhow::Result<()> {
        let bytes = payload.as_bytes();
        // Significant length octet, payload, zero padding out to 31 bytes
        let mut data = Vec::with_capacity(32);
        data.push(bytes.len() as u8);
        data.extend_from_slice(bytes);
        data.resize(32, 0x00);
        self.hci_cmd(OCF_SET_ADVERTISING_DATA, &data).await?;
        self.hci_cmd(OCF_SET_ADVERTISE_ENABLE, &[0x01]).await
    }

    async fn stop_advertising(&mut self) -> anyhow::Result<()> {
        self.hci_cmd(OCF_SET_ADVERTISE_ENABLE, &[0x00]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[derive(Default)]
    struct MockAdvertiser {
        starts: usize,
        stops: usize,
        fail_start: bool,
    }

    impl Advertiser for MockAdvertiser {
        async fn start_advertising(&mut self, _payload: &AdvertisingPayload) -> anyhow::Result<()> {
            self.starts += 1;
            if self.fail_start {
                anyhow::bail!("controller busy");
            }
            Ok(())
        }

        async fn stop_advertising(&mut self) -> anyhow::Result<()> {
            self.stops += 1;
            Ok(())
        }
    }

    fn machine(fail_start: bool) -> AdvertiserStateMachine<MockAdvertiser> {
        let payload = AdvertisingPayload::new(Uuid::nil(), 0, 0, -59);
        AdvertiserStateMachine::new(
            MockAdvertiser {
                fail_start,
                ..MockAdvertiser::default()
            },
            payload,
        )
    }

    #[tokio::test]
    async fn test_power_transition_scenario() {
        let mut machine = machine(false);
        for state in [
            PowerState::PoweredOn,
            PowerState::PoweredOn,
            PowerState::PoweredOff,
            PowerState::Unsupported,
        ] {
            machine.on_power_state(state).await;
        }
        assert_eq!(machine.advertiser.starts, 1);
        assert_eq!(machine.advertiser.stops, 1);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let mut machine = machine(false);
        machine.on_power_state(PowerState::PoweredOff).await;
        assert_eq!(machine.advertiser.stops, 0);
    }

    #[tokio::test]
    async fn test_unknown_state_is_ignored() {
        let mut machine = machine(false);
        machine.on_power_state(PowerState::Unknown).await;
        assert_eq!(machine.advertiser.starts, 0);
        assert_eq!(machine.advertiser.stops, 0);
    }

    #[tokio::test]
    async fn test_failed_start_leaves_machine_stopped() {
        let mut machine = machine(true);
        machine.on_power_state(PowerState::PoweredOn).await;

        // Not advertising, so a power-off has nothing to undo and a later
        // power-on gets another attempt
        machine.on_power_state(PowerState::PoweredOff).await;
        assert_eq!(machine.advertiser.stops, 0);
        machine.on_power_state(PowerState::PoweredOn).await;
        assert_eq!(machine.advertiser.starts, 2);
    }

    #[tokio::test]
    async fn test_unsupported_takes_no_advertising_action() {
        let mut machine = machine(false);
        machine.on_power_state(PowerState::Unsupported).await;
        machine.on_power_state(PowerState::Unsupported).await;
        assert_eq!(machine.advertiser.starts, 0);
        assert_eq!(machine.advertiser.stops, 0);
    }
}
