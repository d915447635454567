//! Notification handling for connected devices
//! One task per subscribed characteristic forwards values to the event pump.

use bluest::{Characteristic, Device};
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::connection::EventSink;
use crate::core::bluetooth::transport::TransportEvent;

/// Subscribes characteristics of one device session.
#[derive(Clone)]
pub struct NotificationHandler {
    device: Device,
    sink: EventSink,
    cancel_token: CancellationToken,
}

impl NotificationHandler {
    pub fn new(device: Device, sink: EventSink, cancel_token: CancellationToken) -> Self {
        Self {
            device,
            sink,
            cancel_token,
        }
    }

    /// Starts forwarding notifications of `characteristic`.
    pub fn setup_notifications(&self, runtime: &Handle, characteristic: Characteristic) {
        info!("Subscribing to notifications on {}", characteristic.uuid());
        let handler = self.clone();
        runtime.spawn(async move {
            let cancel_token = handler.cancel_token.clone();
            tokio::select! {
                _ = handler.process_notifications(characteristic) => {}
                _ = cancel_token.cancelled() => debug!("Notification task cancelled"),
            }
        });
    }

    async fn process_notifications(&self, characteristic: Characteristic) {
        let uuid = characteristic.uuid();
        match characteristic.notify().await {
            Ok(mut notification_stream) => {
                while let Some(result) = notification_stream.next().await {
                    match result {
                        Ok(value) => {
                            debug!("Notification from {}: {:02X?}", uuid, value);
                            self.sink.emit(TransportEvent::CharacteristicChanged {
                                characteristic: uuid,
                                value,
                            });
                        }
                        Err(e) => {
                            error!("Error in notification stream of {}: {}", uuid, e);
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                error!("Failed to subscribe to notifications on {}: {}", uuid, e);
                self.sink.emit(TransportEvent::Error(format!(
                    "Failed to enable notifications on {uuid}: {e}"
                )));
                return;
            }
        }

        info!("Notification stream of {} ended", uuid);
        // A closed stream is how a remote disconnect shows up.
        if !self.device.is_connected().await {
            self.sink.emit(TransportEvent::Disconnected);
        }
    }
}
