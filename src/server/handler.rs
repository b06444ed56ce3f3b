use std::future::Future;

use tokio::io::AsyncWrite;

use crate::http::request::Request;
use crate::http::writer::ResponseWriter;

/// Application logic invoked once per successfully parsed request.
///
/// The handler owns the whole response: status line, headers and body all go
/// through `writer`. The connection is closed as soon as the returned future
/// resolves. If it fails before writing anything the connection answers with
/// `500 Internal Server Error`.
pub trait Handler: Send + Sync + 'static {
    fn handle<W>(
        &self,
        request: Request,
        writer: &mut ResponseWriter<W>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send
    where
        W: AsyncWrite + Unpin + Send;
}
