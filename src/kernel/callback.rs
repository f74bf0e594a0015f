// Deferred units of work
//
// A Callback is a target plus at most one stored parameter. The set of
// parameter shapes is closed; adding a shape means adding a variant and
// a Param impl, never touching the scheduler. invoke() consumes the
// value so a callback can only ever run once.

use alloc::string::String;
use core::fmt;

/// Opaque pointer handed back to a callback untouched.
///
/// The scheduler never dereferences it. Values no wider than a pointer
/// can be smuggled through with [`Context::from_addr`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Context(*mut ());

// SAFETY: the pointer is only stored and handed back on the execution
// context that dispatches it; the scheduler never reads through it.
unsafe impl Send for Context {}
unsafe impl Sync for Context {}

impl Context {
    pub const NULL: Context = Context(core::ptr::null_mut());

    pub const fn from_ptr<T>(ptr: *mut T) -> Self {
        Self(ptr.cast())
    }

    pub fn from_addr(addr: usize) -> Self {
        Self(core::ptr::without_provenance_mut(addr))
    }

    pub const fn as_ptr<T>(self) -> *mut T {
        self.0.cast()
    }

    pub fn addr(self) -> usize {
        self.0.addr()
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Context({:p})", self.0)
    }
}

/// An object whose method can be scheduled.
pub trait Callable: Sync {
    fn callback(&self, ctx: Context);
}

/// An object run on every idle poll.
pub trait Loopable: Sync {
    fn run_loop(&self);
}

pub enum Callback<'a> {
    Plain(fn()),
    Bool(fn(bool), bool),
    I8(fn(i8), i8),
    U8(fn(u8), u8),
    I16(fn(i16), i16),
    U16(fn(u16), u16),
    I32(fn(i32), i32),
    U32(fn(u32), u32),
    I64(fn(i64), i64),
    U64(fn(u64), u64),
    F32(fn(f32), f32),
    F64(fn(f64), f64),
    Pointer(fn(Context), Context),
    Text(fn(String), String),
    Str(fn(&'a str), &'a str),
    Method(&'a dyn Callable, Context),
}

impl<'a> Callback<'a> {
    pub fn invoke(self) {
        match self {
            Callback::Plain(f) => f(),
            Callback::Bool(f, v) => f(v),
            Callback::I8(f, v) => f(v),
            Callback::U8(f, v) => f(v),
            Callback::I16(f, v) => f(v),
            Callback::U16(f, v) => f(v),
            Callback::I32(f, v) => f(v),
            Callback::U32(f, v) => f(v),
            Callback::I64(f, v) => f(v),
            Callback::U64(f, v) => f(v),
            Callback::F32(f, v) => f(v),
            Callback::F64(f, v) => f(v),
            Callback::Pointer(f, ctx) => f(ctx),
            Callback::Text(f, s) => f(s),
            Callback::Str(f, s) => f(s),
            Callback::Method(listener, ctx) => listener.callback(ctx),
        }
    }

    pub const fn shape(&self) -> &'static str {
        match self {
            Callback::Plain(_) => "plain",
            Callback::Bool(..) => "bool",
            Callback::I8(..) => "i8",
            Callback::U8(..) => "u8",
            Callback::I16(..) => "i16",
            Callback::U16(..) => "u16",
            Callback::I32(..) => "i32",
            Callback::U32(..) => "u32",
            Callback::I64(..) => "i64",
            Callback::U64(..) => "u64",
            Callback::F32(..) => "f32",
            Callback::F64(..) => "f64",
            Callback::Pointer(..) => "pointer",
            Callback::Text(..) => "text",
            Callback::Str(..) => "str",
            Callback::Method(..) => "method",
        }
    }
}

impl fmt::Debug for Callback<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Plain(_) => write!(f, "Callback::Plain"),
            Callback::Bool(_, v) => write!(f, "Callback::Bool({})", v),
            Callback::I8(_, v) => write!(f, "Callback::I8({})", v),
            Callback::U8(_, v) => write!(f, "Callback::U8({})", v),
            Callback::I16(_, v) => write!(f, "Callback::I16({})", v),
            Callback::U16(_, v) => write!(f, "Callback::U16({})", v),
            Callback::I32(_, v) => write!(f, "Callback::I32({})", v),
            Callback::U32(_, v) => write!(f, "Callback::U32({})", v),
            Callback::I64(_, v) => write!(f, "Callback::I64({})", v),
            Callback::U64(_, v) => write!(f, "Callback::U64({})", v),
            Callback::F32(_, v) => write!(f, "Callback::F32({})", v),
            Callback::F64(_, v) => write!(f, "Callback::F64({})", v),
            Callback::Pointer(_, ctx) => write!(f, "Callback::Pointer({:?})", ctx),
            Callback::Text(_, s) => write!(f, "Callback::Text({:?})", s),
            Callback::Str(_, s) => write!(f, "Callback::Str({:?})", s),
            Callback::Method(_, ctx) => write!(f, "Callback::Method({:?})", ctx),
        }
    }
}

/// A parameter shape a plain function can be scheduled with.
pub trait Param<'a>: Sized {
    fn bind(f: fn(Self), value: Self) -> Callback<'a>;
}

macro_rules! impl_param {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl<'a> Param<'a> for $ty {
                #[inline]
                fn bind(f: fn(Self), value: Self) -> Callback<'a> {
                    Callback::$variant(f, value)
                }
            }
        )*
    };
}

impl_param! {
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Context => Pointer,
    String => Text,
}

impl<'a> Param<'a> for &'a str {
    #[inline]
    fn bind(f: fn(Self), value: Self) -> Callback<'a> {
        Callback::Str(f, value)
    }
}

/// What dispatch() runs when no entry is due. One at a time.
#[derive(Clone, Copy)]
pub enum IdleHook<'a> {
    Function(fn()),
    Method(&'a dyn Loopable),
}

impl IdleHook<'_> {
    #[inline]
    pub fn run(self) {
        match self {
            IdleHook::Function(f) => f(),
            IdleHook::Method(looper) => looper.run_loop(),
        }
    }
}

impl fmt::Debug for IdleHook<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdleHook::Function(_) => write!(f, "IdleHook::Function"),
            IdleHook::Method(_) => write!(f, "IdleHook::Method"),
        }
    }
}
