use crate::error::CapabilityError;

/// Check that the target can share atomics and memory between threads
///
/// Runs once while the worker initializes, before any ring is allocated.
pub fn detect_capabilities() -> Result<(), CapabilityError> {
    if !cfg!(target_has_atomic = "32") {
        return Err(CapabilityError::MissingAtomics(32));
    }
    if !cfg!(target_has_atomic = "ptr") {
        return Err(CapabilityError::MissingAtomics(usize::BITS));
    }
    // wasm without the atomics feature has no shared linear memory
    if cfg!(all(target_family = "wasm", not(target_feature = "atomics"))) {
        return Err(CapabilityError::NoThreads);
    }
    Ok(())
}
