//! WHOIS family handlers: WHOIS, WHOWAS, USERHOST, ISON.

mod ison;
mod userhost;
mod whois_cmd;
mod whowas;

pub use ison::IsonHandler;
pub use userhost::UserhostHandler;
pub use whois_cmd::WhoisHandler;
pub use whowas::WhowasHandler;
