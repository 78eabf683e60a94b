/*!
`aiclients` holds one client per Agile Infrastructure JSON service. Every client embeds a
[`http::ServiceHttp`], which binds the shared transport to the service's configured endpoint and
maps response codes the same way for all of them:

* `404` becomes [`Error::NotFound`]
* `501` becomes [`Error::NotImplemented`]
* `401` and `403` arrive from the transport and report [`aihttp::ErrorKind::NotAllowed`]
* any other non-2xx status is an error carrying the response body

Clients that change remote state take a dry-run flag; in dry-run mode they log what they would
have done and send nothing.

| Module        | Service                                                     |
|---------------|-------------------------------------------------------------|
| [`foreman`]   | inventory: hosts, hostgroups, parameters, power, lookups     |
| [`enc`]       | classifier                                                  |
| [`pdb`]       | facts and resources                                         |
| [`tbag`]      | secrets                                                     |
| [`roger`]     | alarm state                                                 |
| [`pwn`]       | ownership                                                   |
| [`authz`]     | authorization                                               |
| [`rundeck`]   | job runner                                                  |
| [`certmgr`]   | certificate staging                                         |
*/

#![deny(rust_2018_idioms)]

mod error;
pub mod http;
mod scope;

pub mod authz;
pub mod certmgr;
pub mod enc;
pub mod foreman;
pub mod pdb;
pub mod pwn;
pub mod roger;
pub mod rundeck;
pub mod tbag;

#[cfg(test)]
mod foreman_test;

pub use authz::AuthzClient;
pub use certmgr::CertmgrClient;
pub use enc::EncClient;
pub use error::{Error, Result};
pub use foreman::ForemanClient;
pub use pdb::PdbClient;
pub use pwn::PwnClient;
pub use roger::RogerClient;
pub use rundeck::RundeckClient;
pub use scope::Scope;
pub use tbag::TbagClient;
