use std::{borrow::Cow, collections::HashSet, net::IpAddr};

use snafu::ResultExt as _;
use tracing::trace;

use super::{Filter, FilterError, FilterOutcome, SourceHost};
use crate::record::Record;

/// Block-list filter.
///
/// Rejects records sent from any of a fixed set of IP addresses. IPv4-mapped IPv6 addresses match their IPv4
/// counterparts. Records whose source host is not an IP address (for example, a hostname from a textual source
/// address) are never blocked.
#[derive(Debug, Default)]
pub struct BlocklistFilter {
    blocked: HashSet<IpAddr>,
}

impl BlocklistFilter {
    /// Creates a new `BlocklistFilter` that blocks the given addresses.
    pub fn new<I>(addrs: I) -> Self
    where
        I: IntoIterator<Item = IpAddr>,
    {
        Self {
            blocked: addrs.into_iter().map(|addr| addr.to_canonical()).collect(),
        }
    }
}

impl Filter for BlocklistFilter {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("blocklist")
    }

    fn process(&self, record: Record) -> Result<FilterOutcome, FilterError> {
        let host = record.source.host().context(SourceHost)?;
        let blocked = host
            .parse::<IpAddr>()
            .map(|addr| self.blocked.contains(&addr.to_canonical()))
            .unwrap_or(false);

        if blocked {
            trace!(source = %record.source, "Log rejected by block-list.");
            return Ok(FilterOutcome::Reject);
        }

        Ok(FilterOutcome::Continue(record))
    }
}
