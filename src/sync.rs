#[cfg(all(feature = "sync", feature = "std"))]
pub(crate) use std::sync::Mutex;

#[cfg(all(feature = "sync", not(feature = "std")))]
pub(crate) use spin::Mutex;

/// Container state shared between the container and its storage and stream handles
#[cfg(feature = "sync")]
pub(crate) type Shared<T> = alloc::sync::Arc<Mutex<T>>;
#[cfg(not(feature = "sync"))]
pub(crate) type Shared<T> = alloc::rc::Rc<core::cell::RefCell<T>>;

pub(crate) fn shared<T>(t: T) -> Shared<T> {
    match () {
        #[cfg(feature = "sync")]
        () => alloc::sync::Arc::new(Mutex::new(t)),
        #[cfg(not(feature = "sync"))]
        () => alloc::rc::Rc::new(core::cell::RefCell::new(t)),
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! acquire {
    ($shared: expr) => {
        match () {
            #[cfg(all(feature = "sync", feature = "std"))]
            () => $shared.lock().unwrap(),
            #[cfg(all(feature = "sync", not(feature = "std")))]
            () => $shared.lock(),
            #[cfg(not(feature = "sync"))]
            () => $shared.borrow_mut(),
        }
    };
}

/// Takes the value back out if no other handle shares it
pub(crate) fn unshare<T>(shared: Shared<T>) -> Result<T, Shared<T>> {
    match () {
        #[cfg(all(feature = "sync", feature = "std"))]
        () => alloc::sync::Arc::try_unwrap(shared)
            .map(|mutex| mutex.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())),
        #[cfg(all(feature = "sync", not(feature = "std")))]
        () => alloc::sync::Arc::try_unwrap(shared).map(|mutex| mutex.into_inner()),
        #[cfg(not(feature = "sync"))]
        () => alloc::rc::Rc::try_unwrap(shared).map(|cell| cell.into_inner()),
    }
}
