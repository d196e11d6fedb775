pub mod dispatch;
pub mod msg;
pub mod util;

mod hex;

// Every message or batch decoded by the transport passes through exactly one
// message processing policy before it reaches the protocol stack. The policy
// only decides where delivery runs: inline on the receiving thread, or on the
// shared worker pool. It never looks at what a message means.

// Protocols above this layer (retransmission, flow control, view synchrony)
// depend on regular messages from one sender arriving in the order they were
// received, one at a time. Out-of-band messages carry no such promise and are
// spread over the pool as widely as it allows, so priority traffic never
// waits behind a slow regular sender.

// The per-sender critical sections are short and never wrap the upper stack
// callback, so a stalled application handler only ever holds up its own
// sender.
