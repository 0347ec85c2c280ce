//! HTTP/JSON control plane over the service directory.
//!
//! All routes live under the configured root (default `/director`). Errors
//! carry a JSON body of the form `{"code": "...", "msg": "..."}` where the
//! code is one of the stable strings from [`Error::code`][crate::error::Error::code].
//!
//! # API Endpoints
//!
//! ## `/<root>/services/:type` (PUT)
//!
//!   Registers one service instance under `:type`. Expects a JSON body:
//!
//!   ```json
//!   {
//!     "name": "svc1._http._tcp.example.com.",
//!     "server": "host1.example.com.",
//!     "port": 8080,
//!     "ttl": 60,
//!     "priority": 10,
//!     "weight": 5,
//!     "params": { "path": "/api" }
//!   }
//!   ```
//!
//!   Returns 201 (Created) on success. The instance becomes a PTR, an SRV,
//!   and a TXT record in the configured zone, inserted with one signed
//!   dynamic update.
//!
//! ## `/<root>/services/types/:type` (GET)
//!
//!   Returns 200 with the JSON list of instance names registered under the
//!   service type, in DNS answer order.
//!
//! ## `/<root>/services/instances/:name` (GET)
//!
//!   Returns 200 with the JSON list of instances at the name: one entry per
//!   SRV record, all sharing the parameter map parsed from the TXT record.
//!
//! ## `/<root>/services/types/:type?name=` (DELETE)
//!
//!   Unregisters the named instance from the type. The `name` query
//!   parameter is mandatory. Returns 204 (No Content).
//!
//! ## `/<root>/services/instances/:name?server=&port=` (DELETE)
//!
//!   Removes exactly the `(name, server, port)` instance. Both query
//!   parameters are mandatory. Returns 204 (No Content).

mod api_error;
mod routes;
pub mod server;

pub use server::run;
