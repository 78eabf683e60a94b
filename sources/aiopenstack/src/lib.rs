/*!
`aiopenstack` talks to the cloud services: identity, compute, block volumes and images.

Everything starts from a [`Session`], authenticated with the caller's `OS_*` environment. The
environment has to be set up for identity API v3; anything else is rejected before a request is
sent. Each client then finds its endpoint in the session's service catalog:

```no_run
use aienv::openstack::OpenstackEnv;
use aiopenstack::{CinderClient, NewVolume, Session};
use std::time::Duration;

# fn main() -> Result<(), Box<dyn std::error::Error>> {
let config = aiconfig::Config::new()?;
let session = Session::from_env(&config, &OpenstackEnv::from_env())?;
let cinder = CinderClient::new(&session, false)?;
if let Some(volume) = cinder.create(&NewVolume::new("50GB".parse::<aiopenstack::VolumeSize>()?))? {
    cinder.is_ready(&volume.id, false, Duration::from_secs(300), Duration::from_secs(5))?;
}
# Ok(())
# }
```
*/

#![deny(rust_2018_idioms)]

mod api;
pub mod cinder;
mod error;
pub mod glance;
pub mod nova;
pub mod session;

pub use cinder::{is_valid_size_format, CinderClient, NewVolume, Volume, VolumeSize};
pub use error::{Component, Error, Result};
pub use glance::{GlanceClient, Image, ImageQuery};
pub use nova::{BootOptions, DeviceNames, NovaClient};
pub use session::Session;
