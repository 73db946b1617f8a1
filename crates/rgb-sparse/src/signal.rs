//! Signals, sinks and connections.
//!
//! A [`Sigh`] is a list of listeners called with a mutable context and a
//! copy of the published arguments. Listeners are registered through a
//! [`Sink`], which identifies them by function pointer and optional bound
//! instance so they can be disconnected later, or through the [`Connection`]
//! returned on registration.
//!
//! Publication order is the reverse of registration order. Listeners may
//! connect or disconnect listeners of the signal being published: a listener
//! disconnected before its turn is skipped, a listener connected during a
//! publish is first called by the next one.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

type Callback<C, A> = Rc<dyn Fn(&mut C, A)>;

struct Slot<C, A> {
    id: u64,
    /// Address of the listener function, `None` for closures.
    func: Option<usize>,
    /// Address of the bound instance, if any.
    instance: Option<usize>,
    /// Cleared on disconnect, read by publishes already under way.
    live: Rc<Cell<bool>>,
    call: Callback<C, A>,
}

struct Slots<C, A> {
    list: RefCell<Vec<Slot<C, A>>>,
    next_id: Cell<u64>,
}

impl<C, A> Slots<C, A> {
    /// Swap-and-pop every slot matching `pred`, walking from the back.
    fn disconnect_if(&self, mut pred: impl FnMut(&Slot<C, A>) -> bool) {
        let mut list = self.list.borrow_mut();
        for pos in (0..list.len()).rev() {
            if pred(&list[pos]) {
                list.swap_remove(pos).live.set(false);
            }
        }
    }
}

/// Type-erased handle used by connections.
trait Release {
    fn release(&self, id: u64);
    fn is_connected(&self, id: u64) -> bool;
}

impl<C, A> Release for Slots<C, A> {
    fn release(&self, id: u64) {
        self.disconnect_if(|slot| slot.id == id);
    }

    fn is_connected(&self, id: u64) -> bool {
        self.list.borrow().iter().any(|slot| slot.id == id)
    }
}

/// Listener list invoked with `(&mut C, A)`.
pub struct Sigh<C: 'static, A: 'static> {
    slots: Rc<Slots<C, A>>,
}

impl<C: 'static, A: 'static> Default for Sigh<C, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static, A: 'static> fmt::Debug for Sigh<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sigh").field("len", &self.len()).finish()
    }
}

impl<C: 'static, A: 'static> Sigh<C, A> {
    /// Create a signal with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Rc::new(Slots {
                list: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Another handle to the same listener list.
    pub(crate) fn share(&self) -> Self {
        Self {
            slots: Rc::clone(&self.slots),
        }
    }

    /// Number of listeners.
    pub fn len(&self) -> usize {
        self.slots.list.borrow().len()
    }

    /// Whether there are no listeners.
    pub fn is_empty(&self) -> bool {
        self.slots.list.borrow().is_empty()
    }

    /// Registration façade.
    pub fn sink(&self) -> Sink<'_, C, A> {
        Sink { sigh: self }
    }

    /// Call every listener, most recently connected first.
    pub fn publish(&self, ctx: &mut C, args: A)
    where
        A: Clone,
    {
        let pending: SmallVec<[(Rc<Cell<bool>>, Callback<C, A>); 8]> = self
            .slots
            .list
            .borrow()
            .iter()
            .rev()
            .map(|slot| (Rc::clone(&slot.live), Rc::clone(&slot.call)))
            .collect();

        for (live, call) in pending {
            if live.get() {
                call(ctx, args.clone());
            }
        }
    }

    fn push(&self, func: Option<usize>, instance: Option<usize>, call: Callback<C, A>) -> Connection {
        if func.is_some() {
            self.slots
                .disconnect_if(|slot| slot.func == func && slot.instance == instance);
        }

        let id = self.slots.next_id.get();
        self.slots.next_id.set(id + 1);
        self.slots.list.borrow_mut().push(Slot {
            id,
            func,
            instance,
            live: Rc::new(Cell::new(true)),
            call,
        });

        let slots: Rc<dyn Release> = self.slots.clone();
        Connection {
            slots: Some(Rc::downgrade(&slots)),
            id,
        }
    }
}

fn instance_key<I>(instance: &Rc<I>) -> usize {
    Rc::as_ptr(instance).cast::<()>() as usize
}

/// Connect and disconnect listeners of a [`Sigh`].
pub struct Sink<'a, C: 'static, A: 'static> {
    sigh: &'a Sigh<C, A>,
}

impl<C: 'static, A: 'static> Sink<'_, C, A> {
    /// Connect a free function. Connecting it again moves it to the front.
    pub fn connect(&self, func: fn(&mut C, A)) -> Connection {
        self.sigh
            .push(Some(func as usize), None, Rc::new(func))
    }

    /// Connect a function bound to `instance`.
    ///
    /// The pair `(instance, func)` identifies the listener.
    pub fn connect_bound<I: 'static>(
        &self,
        instance: &Rc<I>,
        func: fn(&I, &mut C, A),
    ) -> Connection {
        let bound = Rc::clone(instance);
        self.sigh.push(
            Some(func as usize),
            Some(instance_key(instance)),
            Rc::new(move |ctx: &mut C, args: A| func(&bound, ctx, args)),
        )
    }

    /// Connect a closure. It can only be removed through its [`Connection`]
    /// or by [`disconnect_all`](Self::disconnect_all).
    pub fn connect_fn(&self, call: impl Fn(&mut C, A) + 'static) -> Connection {
        self.sigh.push(None, None, Rc::new(call))
    }

    /// Disconnect a free function.
    pub fn disconnect(&self, func: fn(&mut C, A)) {
        let key = Some(func as usize);
        self.sigh
            .slots
            .disconnect_if(|slot| slot.func == key && slot.instance.is_none());
    }

    /// Disconnect `func` bound to `instance`.
    pub fn disconnect_bound<I: 'static>(&self, instance: &Rc<I>, func: fn(&I, &mut C, A)) {
        let key = (Some(func as usize), Some(instance_key(instance)));
        self.sigh
            .slots
            .disconnect_if(|slot| (slot.func, slot.instance) == key);
    }

    /// Disconnect every listener bound to `instance`.
    pub fn disconnect_instance<I: 'static>(&self, instance: &Rc<I>) {
        let key = Some(instance_key(instance));
        self.sigh
            .slots
            .disconnect_if(|slot| slot.instance == key);
    }

    /// Disconnect every listener.
    pub fn disconnect_all(&self) {
        self.sigh.slots.disconnect_if(|_| true);
    }

    /// Whether the underlying signal has no listeners.
    pub fn is_empty(&self) -> bool {
        self.sigh.is_empty()
    }
}

/// Handle to a connected listener.
#[derive(Default)]
pub struct Connection {
    slots: Option<Weak<dyn Release>>,
    id: u64,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Connection {
    /// Whether the listener is still connected to a live signal.
    pub fn is_connected(&self) -> bool {
        self.slots
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|slots| slots.is_connected(self.id))
    }

    /// Disconnect the listener. Does nothing if it is already gone.
    pub fn release(&mut self) {
        if let Some(slots) = self.slots.take().and_then(|slots| slots.upgrade()) {
            slots.release(self.id);
        }
    }
}

/// Connection released when dropped.
#[derive(Debug, Default)]
pub struct ScopedConnection {
    conn: Connection,
}

impl ScopedConnection {
    /// Whether the listener is still connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Disconnect the listener now.
    pub fn release(&mut self) {
        self.conn.release();
    }
}

impl From<Connection> for ScopedConnection {
    fn from(conn: Connection) -> Self {
        Self { conn }
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        self.conn.release();
    }
}
