//! Chain discovery: find out how many devices answer on the bus.
//!
//! Probes lengths 1, 2, 3, ... and commits to the last length that
//! answered. An empty bus is a normal state, not an error; hardware may
//! simply not be powered yet.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::chain::adapter::ChainAdapter;
use crate::error::{BatSrvError, Result};

/// Handle to a discovered chain. Replaced wholesale on rediscovery,
/// never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHandle {
    /// Number of live devices, always at least 1.
    pub length: usize,
    pub discovered_at: DateTime<Utc>,
}

/// Probe increasing chain lengths and return the last one that answered.
///
/// Probing at `k + 1` only happens after `k` succeeded; the first failure
/// ends the run. Returns 0 when even a single device fails to answer.
/// `max_length` bounds the run so a bus that acknowledges everything
/// cannot spin forever; hitting the bound commits to it.
pub async fn probe_chain(adapter: &dyn ChainAdapter, max_length: usize) -> usize {
    let mut length = 0;
    while length < max_length {
        match adapter.probe(length + 1).await {
            Ok(()) => length += 1,
            Err(e) => {
                debug!(trial = length + 1, "probe ended the run: {}", e);
                break;
            },
        }
    }
    length
}

/// Full discovery: probe, initialise, warm up.
///
/// `Ok(None)` means no devices answered, a normal condition. An
/// initialisation failure is surfaced as an error; a chain that probed
/// but would not configure risks reading garbage, and the caller decides
/// whether that ends the process. Warm-up measurement failures are
/// logged only; later cycles retry them anyway.
pub async fn discover(
    adapter: &dyn ChainAdapter,
    max_length: usize,
) -> Result<Option<ChainHandle>> {
    let length = probe_chain(adapter, max_length).await;
    if length == 0 {
        return Ok(None);
    }

    adapter
        .initialise(length)
        .await
        .map_err(|e| BatSrvError::init(format!("chain of {length} failed to configure: {e}")))?;

    // One throwaway scan of each kind to settle the converter state.
    if let Err(e) = adapter.measure_voltages(length).await {
        warn!("warm-up voltage scan failed: {}", e);
    }
    if let Err(e) = adapter.measure_temperatures(length).await {
        warn!("warm-up temperature scan failed: {}", e);
    }

    info!(length, "chain discovered and initialised");
    Ok(Some(ChainHandle {
        length,
        discovered_at: Utc::now(),
    }))
}
