use std::sync::Arc;

use homewire_app::ports::{CommandFunc, DeviceAdapter};
use homewire_domain::command::Command;
use homewire_domain::device::Device;
use homewire_domain::error::HubError;

use crate::soap::DeviceClient;

/// Command side of a UPnP switch: any level above zero turns the relay on.
pub struct UpnpAdapter<D> {
    device: Arc<Device>,
    client: Arc<D>,
}

impl<D: DeviceClient> UpnpAdapter<D> {
    pub fn new(device: Arc<Device>, client: Arc<D>) -> Self {
        Self { device, client }
    }
}

impl<D: DeviceClient> DeviceAdapter for UpnpAdapter<D> {
    fn family(&self) -> &'static str {
        "upnp"
    }

    fn build_command(&self, command: &Command) -> Result<CommandFunc, HubError> {
        let Command::ZoneSetLevel { level, .. } = command else {
            return Err(HubError::UnsupportedCommand {
                family: self.family(),
                command: command.kind(),
            });
        };
        let on = *level > 0.0;
        let label = format!("{} SetBinaryState({})", self.device.name, u8::from(on));
        let client = Arc::clone(&self.client);
        let address = self.device.address.clone();
        Ok(CommandFunc::new(label, async move {
            client.set_binary_state(&address, on).await?;
            Ok::<(), HubError>(())
        }))
    }
}
