// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use arbiter_types::{ArbitrationMode, AttachMode, Disk, DiskDescription, MountMode};
use tokio::net::UnixStream;
use zbus::Connection;
use zbus::connection::Builder as ConnectionBuilder;
use zbus::proxy::CacheProperties;

use crate::protocol::names::SERVICE_NAME;

use super::error::ClientError;
use super::proxies::{
    ArbiterInterfaceProxy, ArbitrationInterfaceProxy, DisksInterfaceProxy, ImageInterfaceProxy,
};

/// Client for every `diskarbiterd` operation over a peer-to-peer connection
pub struct ArbiterClient {
    root: ArbiterInterfaceProxy<'static>,
    disks: DisksInterfaceProxy<'static>,
    image: ImageInterfaceProxy<'static>,
    arbitration: ArbitrationInterfaceProxy<'static>,
}

impl ArbiterClient {
    /// Connect to the daemon listening on `socket`.
    pub async fn connect(socket: impl AsRef<Path>) -> Result<Self, ClientError> {
        let socket = socket.as_ref();
        let stream = UnixStream::connect(socket).await.map_err(|e| {
            ClientError::Connection(format!("Failed to connect to {}: {e}", socket.display()))
        })?;

        let connection = ConnectionBuilder::unix_stream(stream)
            .p2p()
            .build()
            .await
            .map_err(|e| ClientError::Connection(format!("D-Bus handshake failed: {e}")))?;

        Self::from_connection(&connection).await
    }

    /// Build a client on top of an established peer connection.
    pub async fn from_connection(connection: &Connection) -> Result<Self, ClientError> {
        // Peer connections have no bus to subscribe to property changes on
        let root = ArbiterInterfaceProxy::builder(connection)
            .destination(SERVICE_NAME)?
            .cache_properties(CacheProperties::No)
            .build()
            .await?;
        let disks = DisksInterfaceProxy::builder(connection)
            .destination(SERVICE_NAME)?
            .cache_properties(CacheProperties::No)
            .build()
            .await?;
        let image = ImageInterfaceProxy::builder(connection)
            .destination(SERVICE_NAME)?
            .cache_properties(CacheProperties::No)
            .build()
            .await?;
        let arbitration = ArbitrationInterfaceProxy::builder(connection)
            .destination(SERVICE_NAME)?
            .cache_properties(CacheProperties::No)
            .build()
            .await?;

        Ok(Self {
            root,
            disks,
            image,
            arbitration,
        })
    }

    pub async fn version(&self) -> Result<String, ClientError> {
        Ok(self.root.version().await?)
    }

    /// List every registered disk
    pub async fn list_disks(&self) -> Result<Vec<Disk>, ClientError> {
        let json = self.disks.list_disks().await?;
        Ok(serde_json::from_str(&json)?)
    }

    pub async fn disk_info(&self, disk_id: &str) -> Result<DiskDescription, ClientError> {
        let json = self.disks.disk_info(disk_id).await?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Mount a disk, returns the resulting mount path
    pub async fn mount_disk(
        &self,
        disk_id: &str,
        mode: MountMode,
        args: &[String],
        path: Option<&Path>,
    ) -> Result<String, ClientError> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let path = path
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(self
            .disks
            .mount_disk(disk_id, mode.as_str(), &args, &path)
            .await?)
    }

    pub async fn unmount_disk(&self, disk_id: &str) -> Result<(), ClientError> {
        Ok(self.disks.unmount_disk(disk_id).await?)
    }

    pub async fn eject_disk(&self, disk_id: &str) -> Result<(), ClientError> {
        Ok(self.disks.eject_disk(disk_id).await?)
    }

    /// Attach a disk image, returns the identifiers of the attached disks
    pub async fn attach_disk(
        &self,
        image_path: &Path,
        mode: AttachMode,
        password: Option<&str>,
    ) -> Result<Vec<String>, ClientError> {
        Ok(self
            .image
            .attach_disk(
                &image_path.to_string_lossy(),
                mode.as_str(),
                password.unwrap_or_default(),
            )
            .await?)
    }

    pub async fn arbitrate(&self, mode: ArbitrationMode) -> Result<(), ClientError> {
        Ok(self.arbitration.arbitrate(mode.as_str()).await?)
    }

    /// Current arbitration mode
    pub async fn mode(&self) -> Result<ArbitrationMode, ClientError> {
        let mode = self.arbitration.mode().await?;
        Ok(mode.parse()?)
    }
}
