//! Process-wide record of which hook points were installed and how to chain to whoever had them before us

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, info, warn};

use super::table::HookTable;
use super::InlineInstaller;
use crate::error::{Error, Result};
use crate::os::SymbolResolver;
use crate::Address;

/// A function to intercept and the dispatcher that replaces it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookPoint {
    /// Exported name of the function
    pub name: &'static str,
    /// Address of the dispatch function
    pub dispatch: Address,
    /// Entry of the host's hook table serving this point, if any
    pub slot: Option<usize>,
}

impl HookPoint {
    /// Hook point for the function exported as `name`
    pub fn new(name: &'static str, dispatch: *const ()) -> Self {
        Self {
            name,
            dispatch: dispatch as Address,
            slot: None,
        }
    }

    /// Sets the hook table entry that serves this point
    pub fn with_slot(mut self, slot: usize) -> Self {
        self.slot = Some(slot);
        self
    }
}

/// Outcome of an installation attempt
#[derive(Debug, Default)]
pub struct InstallReport {
    /// Hooks were installed by an earlier call; nothing was done
    pub already_installed: bool,
    /// Points hooked by this call
    pub installed: Vec<&'static str>,
    /// Points that stay unhooked, with the reason
    pub failed: Vec<(&'static str, Error)>,
}

impl InstallReport {
    /// Report of a call that found hooks already installed
    pub fn already_installed() -> Self {
        Self {
            already_installed: true,
            ..Self::default()
        }
    }

    /// Returns true if nothing failed
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// How calls reaching a dispatcher continue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    /// Installed through the hook table; `previous` is the entry we replaced (0 if none)
    Table { previous: Address },
    /// The original function was overwritten, there is nothing left to chain to
    Inline,
    /// Not installed by us: the dispatcher shadows the function by name, continue with the next definition
    Interposed(Option<Address>),
}

/// Installation state and daisy-chain targets.
///
/// Installation is a one-way `Uninstalled -> Installed` transition; there is no way back.
#[derive(Debug, Default)]
pub struct HookRegistry {
    /// Set as soon as installation starts
    installed: AtomicBool,
    /// Per hook point routing, keyed by name
    routes: RwLock<HashMap<&'static str, Route>>,
}

impl HookRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once installation has started
    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    /// Installs every hook point, either through `table` or by patching the resolved function.
    ///
    /// Only the first call does anything. The state flips before any hook is installed, so a hooked path triggered by
    /// the installation itself sees [`HookRegistry::is_installed`] and returns right away. Failures are scoped to their
    /// hook point and collected in the report.
    pub fn install<S, I>(
        &self,
        points: &[HookPoint],
        table: Option<&HookTable>,
        resolver: &S,
        installer: &mut I,
    ) -> InstallReport
    where
        S: SymbolResolver,
        I: InlineInstaller,
    {
        if let Err(e) = self.begin() {
            debug!("{e}");
            return InstallReport::already_installed();
        }

        let mut report = InstallReport::default();
        for point in points {
            let result = match table {
                Some(table) => self.install_table(point, table),
                None => self.install_inline(point, resolver, installer),
            };
            match result {
                Ok(()) => {
                    debug!(hook = point.name, "hook installed");
                    report.installed.push(point.name);
                }
                Err(e) => {
                    warn!(hook = point.name, error = %e, "failed to install hook");
                    report.failed.push((point.name, e));
                }
            }
        }

        info!(
            installed = report.installed.len(),
            failed = report.failed.len(),
            via_table = table.is_some(),
            "hook installation finished"
        );
        report
    }

    /// Address a dispatcher for `name` should call after doing its work, if any
    pub fn next_handler<S: SymbolResolver>(
        &self,
        name: &'static str,
        resolver: &S,
    ) -> Option<Address> {
        let route = self
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied();

        let route = match route {
            Some(route) => route,
            None => {
                let next = resolver.resolve_next(name);
                *self
                    .routes
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(name)
                    .or_insert(Route::Interposed(next))
            }
        };

        match route {
            Route::Table { previous } => (previous != 0).then_some(previous),
            Route::Inline => None,
            Route::Interposed(next) => next,
        }
    }

    /// Performs the one-way state transition
    fn begin(&self) -> Result<()> {
        if self.installed.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyInstalled);
        }
        Ok(())
    }

    /// Records a route for `name`
    fn set_route(&self, name: &'static str, route: Route) {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, route);
    }

    /// Removes the route for `name`
    fn clear_route(&self, name: &'static str) {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    /// Swaps the table entry of `point` for its dispatcher
    fn install_table(&self, point: &HookPoint, table: &HookTable) -> Result<()> {
        let slot = point.slot.ok_or(Error::NoTableSlot(point.name))?;
        let previous = table.get(slot)?;

        // the chain target has to be in place before the host can call the dispatcher
        self.set_route(point.name, Route::Table { previous });
        table.replace(slot, point.dispatch)?;
        Ok(())
    }

    /// Redirects the exported function of `point` to its dispatcher
    fn install_inline<S, I>(&self, point: &HookPoint, resolver: &S, installer: &mut I) -> Result<()>
    where
        S: SymbolResolver,
        I: InlineInstaller,
    {
        let original = resolver
            .resolve(point.name)
            .ok_or_else(|| Error::SymbolNotFound(point.name.to_owned()))?;

        // Chaining to the next definition would re-enter the patched function
        self.set_route(point.name, Route::Inline);
        // Safety: the resolver returned the entry of an exported function and the dispatcher shares its signature
        let result = unsafe { installer.install(original, point.dispatch) };
        if result.is_err() {
            self.clear_route(point.name);
        }
        result
    }
}
