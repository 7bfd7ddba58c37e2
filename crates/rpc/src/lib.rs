//! Network transport for the document service protocol.
//!
//! Requests and responses travel as CBOR envelopes inside length-prefixed,
//! checksummed frames over a persistent TCP connection. Any number of
//! requests may be in flight; responses are matched by correlation id and
//! may arrive in any order.
//!
//! # Example
//!
//! ```no_run
//! use docflow_protocol::Session;
//! use docflow_rpc::RpcClient;
//!
//! async fn example() -> Result<(), docflow_rpc::Error> {
//!     let client = RpcClient::connect("127.0.0.1:7700".parse().unwrap()).await?;
//!
//!     Session::create(client)
//!         .await?
//!         .run(|doc| async move {
//!             doc.add_heading("Quarterly report", 1).await?;
//!             doc.save("/tmp/report.docx").await
//!         })
//!         .await
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod protocol;
pub mod transport;

pub use error::{CodecError, ConnectionError, Error, ProtocolError, Result};
pub use protocol::{Frame, FrameCodec, FrameType};
pub use transport::{ClientBuilder, ClientConfig, RpcClient, RpcServer, ServerConfig};
