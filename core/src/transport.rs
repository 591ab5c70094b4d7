// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::time::Duration;

use crate::TransportError;

/// Byte transport to a single device
///
/// Implementations exchange one raw request frame for one raw response frame
/// (payload followed by the status word). Exchanges are serialised by the
/// session, transports need not support concurrent use.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Exchange a request frame for a response frame
    async fn exchange(
        &mut self,
        frame: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;

    /// Close the underlying link
    async fn close(&mut self) -> Result<(), TransportError>;
}

#[async_trait::async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn exchange(
        &mut self,
        frame: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        T::exchange(self, frame, timeout).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        T::close(self).await
    }
}
