//! COM servers the harness talks to
//!
//! | Class             | Threading | Interface |
//! |-------------------|-----------|-----------|
//! | `PetShop`         | Both      | IPetShop  |
//! | `GuardDog`        | Free      | IDog      |
//! | `AtlHen`          | Apartment | IHen      |
//! | `FreeThreadedHen` | Free      | IHen      |
//!
//! `AtlCluckObserver` and `Postman` are the client-side halves of the two
//! callback interfaces. A client exports them and passes them as `[in]`
//! interface pointers.
//!
//! The interfaces are described by `idl/Interfaces.idl`.

mod callback;
mod dog;
mod hen;
mod observer;
mod petshop;

pub use dog::GuardDog;
pub use hen::Hen;
pub use observer::{AtlCluckObserver, Postman};
pub use petshop::{PetShop, SHOP_ADDRESS};

use comharness_com::{ClassEntry, ClassRegistry, FnClassFactory, ThreadingModel};
use std::sync::Arc;

/// Source of the interface definitions
pub const INTERFACES_IDL: &str = include_str!("../idl/Interfaces.idl");

pub mod clsid {
    use comharness_com::Clsid;
    use uuid::uuid;

    pub const PET_SHOP: Clsid = uuid!("5011c315-994d-49b4-b737-03a846f590a0");
    pub const GUARD_DOG: Clsid = uuid!("d162d2f7-cdf4-44bc-8018-6058420bcfdc");
    pub const ATL_HEN: Clsid = uuid!("9eedb943-b267-4f0c-b8b6-59fe3851f239");
    pub const FREE_THREADED_HEN: Clsid = uuid!("3aa7c1f5-3335-4d4e-98c7-2a4b5b1e2a61");
    pub const ATL_CLUCK_OBSERVER: Clsid = uuid!("4e8d2b61-7a3f-4c19-8d5e-0b6f9a2c7e34");
}

pub mod progid {
    pub const PET_SHOP: &str = "ManagedServer.PetShop.1";
    pub const GUARD_DOG: &str = "AtlFreeServer.GuardDog.1";
    pub const ATL_HEN: &str = "AtlHenLib.AtlHen.1";
    pub const FREE_THREADED_HEN: &str = "AtlHenLib.FreeThreadedHen.1";
}

pub mod iid {
    use comharness_com::Iid;
    use uuid::uuid;

    pub const IPETSHOP: Iid = uuid!("8a4b7f2e-1c3d-4e5f-9a0b-6c7d8e9f0a11");
    pub const IDOG: Iid = uuid!("8a4b7f2e-1c3d-4e5f-9a0b-6c7d8e9f0a12");
    pub const IPOSTMAN: Iid = uuid!("8a4b7f2e-1c3d-4e5f-9a0b-6c7d8e9f0a13");
    pub const IHEN: Iid = uuid!("8a4b7f2e-1c3d-4e5f-9a0b-6c7d8e9f0a14");
    pub const IASYNC_CLUCK_OBSERVER: Iid = uuid!("8a4b7f2e-1c3d-4e5f-9a0b-6c7d8e9f0a15");
}

/// Operation numbers. Every interface derives from IUnknown, so the first
/// method of each is opnum 3.
pub mod opnum {
    pub const BUY_DOG: u16 = 3;
    pub const GET_ADDRESS: u16 = 4;

    pub const SIT: u16 = 3;
    pub const BITE: u16 = 4;

    pub const ON_BITTEN: u16 = 3;

    pub const CLUCK: u16 = 3;
    pub const CLUCK_ASYNC: u16 = 4;

    pub const ON_CLUCK: u16 = 3;
}

/// Register every server class with `registry`.
pub fn register_classes(registry: &ClassRegistry) {
    registry.register(
        ClassEntry::new(clsid::PET_SHOP, ThreadingModel::Both, Arc::new(FnClassFactory(PetShop::create)))
            .with_progid(progid::PET_SHOP),
    );
    registry.register(
        ClassEntry::new(clsid::GUARD_DOG, ThreadingModel::Free, Arc::new(FnClassFactory(GuardDog::create)))
            .with_progid(progid::GUARD_DOG),
    );
    registry.register(
        ClassEntry::new(clsid::ATL_HEN, ThreadingModel::Apartment, Arc::new(FnClassFactory(Hen::create)))
            .with_progid(progid::ATL_HEN),
    );
    registry.register(
        ClassEntry::new(clsid::FREE_THREADED_HEN, ThreadingModel::Free, Arc::new(FnClassFactory(Hen::create)))
            .with_progid(progid::FREE_THREADED_HEN),
    );
}

/// A registry holding the server classes
pub fn class_registry() -> Arc<ClassRegistry> {
    let registry = Arc::new(ClassRegistry::new());
    register_classes(&registry);
    registry
}
