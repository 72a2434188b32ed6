#![forbid(unsafe_code)]

//! Combining several inputs into one derived value.
//!
//! [`join`] mirrors a list of homogeneous inputs into a `Vec`, [`join2`] and
//! [`join3`] do the same for heterogeneous inputs as tuples, and [`concat`]
//! builds a string out of literal and reactive parts.
//!
//! Joined values use [`Comparator::never`]: every upstream notification
//! produces exactly one notification of the joined value, even if the
//! positional replace leaves it unchanged. Two inputs changing one after the
//! other produce two notifications; nothing is batched.

use std::rc::Rc;

use crate::comparator::Comparator;
use crate::config::NotifyConfig;
use crate::derived::{Derived, derive};
use crate::id::ObservableId;
use crate::observable::Observable;
use crate::source::{MaybeObservable, Source};

/// Subscribe `cell` to `source`, writing each new upstream value into a
/// copy of the joined value with `apply`.
fn bind<T, V>(
    cell: &Observable<V>,
    source: &dyn Source<T>,
    apply: impl Fn(&mut V, &T) + 'static,
) where
    T: 'static,
    V: Clone + 'static,
{
    let weak_cell = cell.downgrade();
    let sub = source.subscribe_dyn(Rc::new(move |value: &T, _: ObservableId| {
        let Some(cell) = Observable::upgrade(&weak_cell) else {
            return;
        };
        let mut next = cell.get();
        apply(&mut next, value);
        cell.publish(next);
    }));
    cell.attach(sub);
}

/// Configuration of the first reactive input, or the default.
fn inherited(configs: impl IntoIterator<Item = Option<NotifyConfig>>) -> NotifyConfig {
    configs.into_iter().flatten().next().unwrap_or_default()
}

/// Join homogeneous inputs into a `Vec` that mirrors their positions.
pub fn join<T: Clone + 'static>(inputs: Vec<MaybeObservable<T>>) -> Derived<Vec<T>> {
    let config = inherited(inputs.iter().map(MaybeObservable::config));
    let initial = inputs.iter().map(MaybeObservable::get).collect();
    let cell = Observable::with_config(initial, Comparator::never(), config);

    for (position, input) in inputs.into_iter().enumerate() {
        if let MaybeObservable::Observed(source) = input {
            bind(&cell, source.as_ref(), move |values: &mut Vec<T>, value: &T| {
                if let Some(slot) = values.get_mut(position) {
                    *slot = value.clone();
                }
            });
        }
    }
    Derived::from_cell(cell)
}

/// Join two inputs of different types into a pair.
pub fn join2<A, B>(
    a: impl Into<MaybeObservable<A>>,
    b: impl Into<MaybeObservable<B>>,
) -> Derived<(A, B)>
where
    A: Clone + 'static,
    B: Clone + 'static,
{
    let (a, b) = (a.into(), b.into());
    let config = inherited([a.config(), b.config()]);
    let cell = Observable::with_config((a.get(), b.get()), Comparator::never(), config);

    if let MaybeObservable::Observed(source) = a {
        bind(&cell, source.as_ref(), |pair: &mut (A, B), value: &A| {
            pair.0 = value.clone();
        });
    }
    if let MaybeObservable::Observed(source) = b {
        bind(&cell, source.as_ref(), |pair: &mut (A, B), value: &B| {
            pair.1 = value.clone();
        });
    }
    Derived::from_cell(cell)
}

/// Join three inputs of different types into a triple.
pub fn join3<A, B, C>(
    a: impl Into<MaybeObservable<A>>,
    b: impl Into<MaybeObservable<B>>,
    c: impl Into<MaybeObservable<C>>,
) -> Derived<(A, B, C)>
where
    A: Clone + 'static,
    B: Clone + 'static,
    C: Clone + 'static,
{
    let (a, b, c) = (a.into(), b.into(), c.into());
    let config = inherited([a.config(), b.config(), c.config()]);
    let cell = Observable::with_config((a.get(), b.get(), c.get()), Comparator::never(), config);

    if let MaybeObservable::Observed(source) = a {
        bind(&cell, source.as_ref(), |triple: &mut (A, B, C), value: &A| {
            triple.0 = value.clone();
        });
    }
    if let MaybeObservable::Observed(source) = b {
        bind(&cell, source.as_ref(), |triple: &mut (A, B, C), value: &B| {
            triple.1 = value.clone();
        });
    }
    if let MaybeObservable::Observed(source) = c {
        bind(&cell, source.as_ref(), |triple: &mut (A, B, C), value: &C| {
            triple.2 = value.clone();
        });
    }
    Derived::from_cell(cell)
}

/// Build a string from literal and reactive parts, recomputed whenever a
/// reactive part changes.
///
/// ```
/// use cellflow_core::{MaybeObservable, Observable, concat};
///
/// let name = Observable::new(String::from("world"));
/// let greeting = concat(vec![
///     "hello, ".into(),
///     (&name).into(),
///     MaybeObservable::Value(String::from("!")),
/// ]);
/// assert_eq!(greeting.get(), "hello, world!");
/// name.set("there".into());
/// assert_eq!(greeting.get(), "hello, there!");
/// ```
pub fn concat(parts: Vec<MaybeObservable<String>>) -> Derived<String> {
    derive(&join(parts), |parts: &Vec<String>, _| parts.concat())
}

impl<T: Clone + 'static> From<&Observable<T>> for MaybeObservable<T> {
    fn from(source: &Observable<T>) -> Self {
        Self::Observed(Rc::new(source.clone()))
    }
}

impl<T: Clone + 'static> From<Observable<T>> for MaybeObservable<T> {
    fn from(source: Observable<T>) -> Self {
        Self::Observed(Rc::new(source))
    }
}

impl<T: Clone + 'static> From<&Derived<T>> for MaybeObservable<T> {
    fn from(source: &Derived<T>) -> Self {
        Self::Observed(Rc::new(source.clone()))
    }
}

impl<T: Clone + 'static> From<Derived<T>> for MaybeObservable<T> {
    fn from(source: Derived<T>) -> Self {
        Self::Observed(Rc::new(source))
    }
}

impl From<&str> for MaybeObservable<String> {
    fn from(value: &str) -> Self {
        Self::Value(value.to_owned())
    }
}

impl From<String> for MaybeObservable<String> {
    fn from(value: String) -> Self {
        Self::Value(value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
