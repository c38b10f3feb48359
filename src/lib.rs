/*!
 * flexdb
 *
 * A small in-memory data store speaking a Redis-like wire protocol
 * (RESP), built around a sum-typed [`value::Value`] shared by the wire
 * codecs, the command interpreter interface, and the store itself.
 *
 * - [`value`] — the `Value` model: scalars, vectors, hashes, a visitor
 *   for dispatching over them, and `Access`, a fuzzy-conversion façade
 *   used by command implementations.
 * - [`resp`] / [`json`] — wire codecs over that model.
 * - [`command`] — the `CommandHandler` interpreter interface.
 * - [`database`] / [`sort`] — the in-memory store and its `SORT`.
 * - [`protocol_handler`] — per-connection RESP session glue.
 * - [`error`] / [`bits`] / [`format`] — shared error taxonomy, bit
 *   utilities, and printf-style number formatting.
 */

pub mod bits;
pub mod command;
pub mod database;
pub mod error;
pub mod format;
pub mod json;
pub mod protocol_handler;
pub mod resp;
pub mod sort;
pub mod value;

pub use command::CommandHandler;
pub use database::Database;
pub use error::Error;
pub use protocol_handler::ProtocolHandler;
pub use value::Value;
