//! Dependency-ordered system initialization.

use std::collections::HashMap;

use tracing::{debug, trace};

use super::spec::{Exports, System, SystemId};
use crate::error::Result;
use crate::realm::Realm;

/// Initialize `systems` and everything they depend on in `realm`.
///
/// Each distinct system runs once even when several dependants share it,
/// and always after its own dependencies. The returned map holds the
/// exports of every initialized system.
pub fn compose(realm: &Realm, systems: &[System]) -> Result<Exports> {
    let mut composer = Composer {
        realm,
        initialized: HashMap::new(),
        merged: Exports::new(),
    };
    for system in systems {
        composer.visit(system)?;
    }
    debug!(
        realm = %realm.name(),
        systems = composer.initialized.len(),
        exports = composer.merged.len(),
        "systems composed"
    );
    Ok(composer.merged)
}

struct Composer<'a> {
    realm: &'a Realm,
    initialized: HashMap<SystemId, Exports>,
    merged: Exports,
}

impl Composer<'_> {
    fn visit(&mut self, system: &System) -> Result<Exports> {
        if let Some(exports) = self.initialized.get(&system.id()) {
            return Ok(exports.clone());
        }

        // Dependencies are fixed when a system is defined, so the graph of
        // systems cannot contain a cycle.
        let mut dependencies = Vec::with_capacity(system.dependencies().len());
        for dependency in system.dependencies() {
            dependencies.push(self.visit(dependency)?);
        }

        trace!(
            realm = %self.realm.name(),
            system = system.name().unwrap_or("<anonymous>"),
            "initializing system"
        );
        let exports = system.init(self.realm, &dependencies)?;
        self.merged.merge(&exports)?;
        self.initialized.insert(system.id(), exports.clone());
        Ok(exports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RealmError;
    use crate::system::system;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn shared_dependencies_initialize_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let base = System::named(
            "base",
            move |realm, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Exports::new().with("base", realm.cell(1_i32)))
            },
            vec![],
        );
        let left = system(
            |realm, deps| {
                let base = deps[0].get::<i32>("base")?;
                let left = realm.signal::<i32>();
                realm.link(base, left)?;
                Ok(Exports::new().with("left", left))
            },
            vec![base.clone()],
        );
        let right = system(
            |realm, deps| {
                deps[0].get::<i32>("base")?;
                Ok(Exports::new().with("right", realm.signal::<i32>()))
            },
            vec![base.clone()],
        );

        let realm = Realm::new();
        let exports = compose(&realm, &[left, right, base]).unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(exports.names().collect::<Vec<_>>(), ["base", "left", "right"]);
    }

    #[test]
    fn dependencies_arrive_in_declared_order() {
        let first = system(|realm, _| Ok(Exports::new().with("first", realm.cell(1_u8))), vec![]);
        let second = system(|realm, _| Ok(Exports::new().with("second", realm.cell(2_u8))), vec![]);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = seen.clone();
        let top = system(
            move |_, deps| {
                for exports in deps {
                    log.lock().extend(exports.names().map(str::to_string));
                }
                Ok(Exports::new())
            },
            vec![second, first],
        );

        compose(&Realm::new(), &[top]).unwrap();
        assert_eq!(*seen.lock(), ["second", "first"]);
    }

    #[test]
    fn colliding_exports_fail_composition() {
        let a = system(|realm, _| Ok(Exports::new().with("value", realm.cell(1_i32))), vec![]);
        let b = system(|realm, _| Ok(Exports::new().with("value", realm.cell(2_i32))), vec![]);

        let err = compose(&Realm::new(), &[a, b]).unwrap_err();
        assert_eq!(
            err,
            RealmError::DuplicateExport {
                name: "value".to_string()
            }
        );
    }

    #[test]
    fn initializer_errors_propagate() {
        let broken = system(|_, _| Err(RealmError::Disposed), vec![]);
        let dependant = system(|_, _| Ok(Exports::new()), vec![broken]);

        assert_eq!(
            compose(&Realm::new(), &[dependant]).unwrap_err(),
            RealmError::Disposed
        );
    }
}
