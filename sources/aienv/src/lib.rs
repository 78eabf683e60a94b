/*!
`aienv` inspects the environment an Agile Infrastructure tool runs in:

* [`krb5`]: the caller's Kerberos ticket-granting ticket, which every authenticated request relies on
* [`openstack`]: the cloud identity variables (`OS_*`) exported by the caller's shell
* [`dns`]: FQDN validation and canonicalisation, short names, random hostnames and
  load-balanced alias dereferencing
* [`userdata`]: assembly of the multipart user-data handed to new virtual machines
*/

#![deny(rust_2018_idioms)]

pub mod dns;
pub mod krb5;
pub mod openstack;
pub mod userdata;
