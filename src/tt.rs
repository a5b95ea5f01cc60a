use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex, Weak};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Interned hierarchical name such as `eq.refl`. Equality and hashing are by pointer.
#[derive(Debug, Clone)]
pub struct Name(Arc<String>);

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct Id(usize);

static NAME_TABLE: Lazy<Mutex<HashMap<String, Weak<String>>>> = Lazy::new(Default::default);

static ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

#[derive(Error, Debug, Clone)]
#[error("invalid name '{0}'")]
pub struct InvalidNameError(pub String);

impl Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn is_valid_name(value: &str) -> bool {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^[\p{L}_][\p{L}\p{N}_']*(\.[\p{L}\p{N}_']+)*$").unwrap());
    RE.is_match(value)
}

impl Name {
    /// Interns `value` without validating it.
    pub fn from_str(value: &str) -> Name {
        let mut table = NAME_TABLE.lock().unwrap();
        if let Some(existing) = table.get(value).and_then(|weak| weak.upgrade()) {
            return Name(existing);
        }

        let owned = Arc::new(value.to_owned());
        table.insert(value.to_owned(), Arc::downgrade(&owned));
        Name(owned)
    }

    /// Interns `value`, which must be a dot-separated sequence of identifiers.
    /// This is the entry point for names coming from user input.
    pub fn intern(value: &str) -> Result<Name, InvalidNameError> {
        if !is_valid_name(value) {
            return Err(InvalidNameError(value.to_owned()));
        }
        Ok(Name::from_str(value))
    }

    pub fn is_valid(&self) -> bool {
        is_valid_name(self.as_str())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// `eq.extend("refl") == eq.refl`
    pub fn extend(&self, suffix: impl AsRef<str>) -> Name {
        Name::from_str(&format!("{}.{}", self.0, suffix.as_ref()))
    }

    pub fn prefix(&self) -> Option<Name> {
        let (prefix, _) = self.0.rsplit_once('.')?;
        Some(Name::from_str(prefix))
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Id {
    pub fn fresh() -> Self {
        let id = ID_COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Id(id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Zero,
    Succ(Arc<Level>),
    Max(Arc<Level>, Arc<Level>),
    IMax(Arc<Level>, Arc<Level>),
    Param(Name),
    Meta(LevelMeta),
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LevelMeta {
    pub id: Id,
    // for pretty-printing
    pub name: Name,
}

impl Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn fmt_arg(l: &Level, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match l {
                Level::Max(..) | Level::IMax(..) => write!(f, "({l})"),
                Level::Succ(_) if l.to_offset().0 != &Level::Zero => write!(f, "({l})"),
                _ => write!(f, "{l}"),
            }
        }

        match self {
            Level::Zero => write!(f, "0"),
            Level::Succ(_) => {
                let (base, k) = self.to_offset();
                if *base == Level::Zero {
                    write!(f, "{k}")
                } else {
                    fmt_arg(base, f)?;
                    write!(f, "+{k}")
                }
            }
            Level::Max(l1, l2) => {
                write!(f, "max ")?;
                fmt_arg(l1, f)?;
                write!(f, " ")?;
                fmt_arg(l2, f)
            }
            Level::IMax(l1, l2) => {
                write!(f, "imax ")?;
                fmt_arg(l1, f)?;
                write!(f, " ")?;
                fmt_arg(l2, f)
            }
            Level::Param(name) => write!(f, "{name}"),
            Level::Meta(meta) => write!(f, "?{}", meta.name),
        }
    }
}

impl Level {
    pub fn of_nat(n: usize) -> Level {
        let mut l = Level::Zero;
        for _ in 0..n {
            l = l.succ();
        }
        l
    }

    pub fn succ(&self) -> Level {
        Level::Succ(Arc::new(self.clone()))
    }

    pub fn mk_max(&self, other: &Level) -> Level {
        Level::Max(Arc::new(self.clone()), Arc::new(other.clone()))
    }

    pub fn imax(&self, other: &Level) -> Level {
        Level::IMax(Arc::new(self.clone()), Arc::new(other.clone()))
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Level::Zero)
    }

    /// Splits `l+k` into `(l, k)`.
    pub fn to_offset(&self) -> (&Level, usize) {
        let mut l = self;
        let mut k = 0;
        while let Level::Succ(inner) = l {
            l = inner;
            k += 1;
        }
        (l, k)
    }

    pub fn has_meta(&self) -> bool {
        match self {
            Level::Zero | Level::Param(_) => false,
            Level::Succ(l) => l.has_meta(),
            Level::Max(l1, l2) | Level::IMax(l1, l2) => l1.has_meta() || l2.has_meta(),
            Level::Meta(_) => true,
        }
    }

    pub fn replace(&self, f: &impl Fn(&Level) -> Option<Level>) -> Level {
        if let Some(l) = f(self) {
            return l;
        }
        match self {
            Level::Zero | Level::Param(_) | Level::Meta(_) => self.clone(),
            Level::Succ(l) => l.replace(f).succ(),
            Level::Max(l1, l2) => l1.replace(f).mk_max(&l2.replace(f)),
            Level::IMax(l1, l2) => l1.replace(f).imax(&l2.replace(f)),
        }
    }

    /// Simultaneously substitute `l₁ ⋯ lₙ` for the parameters `u₁ ⋯ uₙ`.
    pub fn instantiate(&self, params: &[Name], levels: &[Level]) -> Level {
        self.replace(&|l| match l {
            Level::Param(name) => params
                .iter()
                .position(|p| p == name)
                .and_then(|i| levels.get(i).cloned()),
            _ => None,
        })
    }

    /// Applies the trivial simplifications `max l 0 = l`, `imax l 0 = 0`,
    /// `imax l (succ l') = max l (succ l')`, `imax 0 l = l` and `max l l = l`.
    pub fn normalize(&self) -> Level {
        match self {
            Level::Zero | Level::Param(_) | Level::Meta(_) => self.clone(),
            Level::Succ(l) => l.normalize().succ(),
            Level::Max(l1, l2) => {
                let l1 = l1.normalize();
                let l2 = l2.normalize();
                if l1.is_zero() || l1 == l2 {
                    l2
                } else if l2.is_zero() {
                    l1
                } else {
                    l1.mk_max(&l2)
                }
            }
            Level::IMax(l1, l2) => {
                let l1 = l1.normalize();
                let l2 = l2.normalize();
                match l2 {
                    Level::Zero => Level::Zero,
                    Level::Succ(_) => Level::Max(Arc::new(l1), Arc::new(l2)).normalize(),
                    _ if l1.is_zero() || l1 == l2 => l2,
                    _ => l1.imax(&l2),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BinderInfo {
    #[default]
    Default,
    Implicit,
    StrictImplicit,
    InstImplicit,
}

impl BinderInfo {
    pub fn is_explicit(&self) -> bool {
        matches!(self, BinderInfo::Default)
    }

    pub fn is_inst_implicit(&self) -> bool {
        matches!(self, BinderInfo::InstImplicit)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ExprMetadata {
    // every loose bound variable has an index smaller than this
    pub bound: usize,
    pub has_meta: bool,
    pub has_univ_meta: bool,
    pub has_local: bool,
}

impl ExprMetadata {
    fn union(&self, other: &ExprMetadata) -> ExprMetadata {
        ExprMetadata {
            bound: self.bound.max(other.bound),
            has_meta: self.has_meta || other.has_meta,
            has_univ_meta: self.has_univ_meta || other.has_univ_meta,
            has_local: self.has_local || other.has_local,
        }
    }

    fn under_binder(&self) -> ExprMetadata {
        ExprMetadata {
            bound: self.bound.saturating_sub(1),
            ..self.clone()
        }
    }
}

/// Locally nameless representation. Bound variables are de Bruijn indices, free
/// variables are [Expr::Local]s carrying their own type.
#[derive(Clone, Debug)]
pub enum Expr {
    Var(Arc<ExprVar>),
    Sort(Arc<ExprSort>),
    Const(Arc<ExprConst>),
    Local(Arc<ExprLocal>),
    Meta(Arc<ExprMeta>),
    App(Arc<ExprApp>),
    Lam(Arc<ExprBinder>),
    Pi(Arc<ExprBinder>),
    Let(Arc<ExprLet>),
    Macro(Arc<ExprMacro>),
}

#[derive(Clone, Debug)]
pub struct ExprVar {
    pub metadata: ExprMetadata,
    pub index: usize,
}

#[derive(Clone, Debug)]
pub struct ExprSort {
    pub metadata: ExprMetadata,
    pub level: Level,
}

#[derive(Clone, Debug)]
pub struct ExprConst {
    pub metadata: ExprMetadata,
    pub name: Name,
    pub levels: Vec<Level>,
}

#[derive(Clone, Debug)]
pub struct ExprLocal {
    pub metadata: ExprMetadata,
    pub id: Id,
    // for pretty-printing
    pub name: Name,
    pub ty: Expr,
    pub info: BinderInfo,
}

#[derive(Clone, Debug)]
pub struct ExprMeta {
    pub metadata: ExprMetadata,
    pub id: Id,
    // for pretty-printing
    pub name: Name,
    pub ty: Expr,
}

#[derive(Clone, Debug)]
pub struct ExprApp {
    pub metadata: ExprMetadata,
    pub fun: Expr,
    pub arg: Expr,
}

#[derive(Clone, Debug)]
pub struct ExprBinder {
    pub metadata: ExprMetadata,
    // for pretty-printing
    pub binder_name: Name,
    pub binder_info: BinderInfo,
    pub binder_type: Expr,
    pub body: Expr,
}

#[derive(Clone, Debug)]
pub struct ExprLet {
    pub metadata: ExprMetadata,
    pub binder_name: Name,
    pub binder_type: Expr,
    pub value: Expr,
    pub body: Expr,
}

/// An opaque extension node. It never reduces and is compared structurally.
#[derive(Clone, Debug)]
pub struct ExprMacro {
    pub metadata: ExprMetadata,
    pub def: Name,
    pub args: Vec<Expr>,
}

pub fn mk_var(index: usize) -> Expr {
    let metadata = ExprMetadata {
        bound: index + 1,
        ..Default::default()
    };
    Expr::Var(Arc::new(ExprVar { metadata, index }))
}

pub fn mk_sort(level: Level) -> Expr {
    let metadata = ExprMetadata {
        has_univ_meta: level.has_meta(),
        ..Default::default()
    };
    Expr::Sort(Arc::new(ExprSort { metadata, level }))
}

pub fn mk_prop() -> Expr {
    mk_sort(Level::Zero)
}

pub fn mk_const(name: Name, levels: Vec<Level>) -> Expr {
    let metadata = ExprMetadata {
        has_univ_meta: levels.iter().any(Level::has_meta),
        ..Default::default()
    };
    Expr::Const(Arc::new(ExprConst {
        metadata,
        name,
        levels,
    }))
}

pub fn mk_local(id: Id, name: Name, ty: Expr, info: BinderInfo) -> Expr {
    let metadata = ExprMetadata {
        has_local: true,
        ..Default::default()
    };
    Expr::Local(Arc::new(ExprLocal {
        metadata,
        id,
        name,
        ty,
        info,
    }))
}

pub fn mk_meta(id: Id, name: Name, ty: Expr) -> Expr {
    let metadata = ExprMetadata {
        has_meta: true,
        ..Default::default()
    };
    Expr::Meta(Arc::new(ExprMeta {
        metadata,
        id,
        name,
        ty,
    }))
}

pub fn mk_app(fun: Expr, arg: Expr) -> Expr {
    let metadata = fun.metadata().union(arg.metadata());
    Expr::App(Arc::new(ExprApp { metadata, fun, arg }))
}

fn mk_binder(binder_name: Name, binder_info: BinderInfo, binder_type: Expr, body: Expr) -> ExprBinder {
    let metadata = binder_type
        .metadata()
        .union(&body.metadata().under_binder());
    ExprBinder {
        metadata,
        binder_name,
        binder_info,
        binder_type,
        body,
    }
}

pub fn mk_lambda(binder_name: Name, binder_info: BinderInfo, binder_type: Expr, body: Expr) -> Expr {
    Expr::Lam(Arc::new(mk_binder(binder_name, binder_info, binder_type, body)))
}

pub fn mk_pi(binder_name: Name, binder_info: BinderInfo, binder_type: Expr, body: Expr) -> Expr {
    Expr::Pi(Arc::new(mk_binder(binder_name, binder_info, binder_type, body)))
}

/// `A → B`, where `B` does not refer to the bound variable.
pub fn mk_arrow(dom: Expr, cod: Expr) -> Expr {
    mk_pi(Name::from_str("a"), BinderInfo::Default, dom, cod.lift_loose(1))
}

pub fn mk_let(binder_name: Name, binder_type: Expr, value: Expr, body: Expr) -> Expr {
    let metadata = binder_type
        .metadata()
        .union(value.metadata())
        .union(&body.metadata().under_binder());
    Expr::Let(Arc::new(ExprLet {
        metadata,
        binder_name,
        binder_type,
        value,
        body,
    }))
}

pub fn mk_macro(def: Name, args: Vec<Expr>) -> Expr {
    let metadata = args
        .iter()
        .fold(ExprMetadata::default(), |acc, arg| acc.union(arg.metadata()));
    Expr::Macro(Arc::new(ExprMacro {
        metadata,
        def,
        args,
    }))
}

fn abstract_binders(locals: &[Expr], body: &Expr, pi: bool) -> Expr {
    let locals: Vec<&ExprLocal> = locals.iter().filter_map(Expr::as_local).collect();
    let ids: Vec<Id> = locals.iter().map(|local| local.id).collect();
    let mut result = body.abstract_locals(&ids);
    for (i, local) in locals.iter().enumerate().rev() {
        let ty = local.ty.abstract_locals(&ids[..i]);
        result = if pi {
            mk_pi(local.name.clone(), local.info, ty, result)
        } else {
            mk_lambda(local.name.clone(), local.info, ty, result)
        };
    }
    result
}

/// Returns `Π xs, body`. Entries of `locals` that are not locals are ignored.
pub fn mk_pi_locals(locals: &[Expr], body: &Expr) -> Expr {
    abstract_binders(locals, body, true)
}

/// Returns `λ xs, body`. Entries of `locals` that are not locals are ignored.
pub fn mk_lambda_locals(locals: &[Expr], body: &Expr) -> Expr {
    abstract_binders(locals, body, false)
}

impl PartialEq for Expr {
    /// Structural equality. Binder names and binder annotations are ignored.
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self, other) {
            (Expr::Var(a), Expr::Var(b)) => a.index == b.index,
            (Expr::Sort(a), Expr::Sort(b)) => a.level == b.level,
            (Expr::Const(a), Expr::Const(b)) => a.name == b.name && a.levels == b.levels,
            (Expr::Local(a), Expr::Local(b)) => a.id == b.id,
            (Expr::Meta(a), Expr::Meta(b)) => a.id == b.id,
            (Expr::App(a), Expr::App(b)) => a.fun == b.fun && a.arg == b.arg,
            (Expr::Lam(a), Expr::Lam(b)) | (Expr::Pi(a), Expr::Pi(b)) => {
                a.binder_type == b.binder_type && a.body == b.body
            }
            (Expr::Let(a), Expr::Let(b)) => {
                a.binder_type == b.binder_type && a.value == b.value && a.body == b.body
            }
            (Expr::Macro(a), Expr::Macro(b)) => a.def == b.def && a.args == b.args,
            _ => false,
        }
    }
}

impl Eq for Expr {}

impl Expr {
    #[inline]
    pub fn metadata(&self) -> &ExprMetadata {
        match self {
            Expr::Var(inner) => &inner.metadata,
            Expr::Sort(inner) => &inner.metadata,
            Expr::Const(inner) => &inner.metadata,
            Expr::Local(inner) => &inner.metadata,
            Expr::Meta(inner) => &inner.metadata,
            Expr::App(inner) => &inner.metadata,
            Expr::Lam(inner) => &inner.metadata,
            Expr::Pi(inner) => &inner.metadata,
            Expr::Let(inner) => &inner.metadata,
            Expr::Macro(inner) => &inner.metadata,
        }
    }

    pub fn ptr_eq(&self, other: &Expr) -> bool {
        match (self, other) {
            (Expr::Var(a), Expr::Var(b)) => Arc::ptr_eq(a, b),
            (Expr::Sort(a), Expr::Sort(b)) => Arc::ptr_eq(a, b),
            (Expr::Const(a), Expr::Const(b)) => Arc::ptr_eq(a, b),
            (Expr::Local(a), Expr::Local(b)) => Arc::ptr_eq(a, b),
            (Expr::Meta(a), Expr::Meta(b)) => Arc::ptr_eq(a, b),
            (Expr::App(a), Expr::App(b)) => Arc::ptr_eq(a, b),
            (Expr::Lam(a), Expr::Lam(b)) => Arc::ptr_eq(a, b),
            (Expr::Pi(a), Expr::Pi(b)) => Arc::ptr_eq(a, b),
            (Expr::Let(a), Expr::Let(b)) => Arc::ptr_eq(a, b),
            (Expr::Macro(a), Expr::Macro(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn has_meta(&self) -> bool {
        self.metadata().has_meta
    }

    pub fn has_univ_meta(&self) -> bool {
        self.metadata().has_univ_meta
    }

    pub fn has_loose_vars(&self) -> bool {
        self.metadata().bound > 0
    }

    pub fn is_sort(&self) -> bool {
        matches!(self, Expr::Sort(_))
    }

    pub fn is_app(&self) -> bool {
        matches!(self, Expr::App(_))
    }

    pub fn is_pi(&self) -> bool {
        matches!(self, Expr::Pi(_))
    }

    pub fn is_lambda(&self) -> bool {
        matches!(self, Expr::Lam(_))
    }

    pub fn is_binding(&self) -> bool {
        matches!(self, Expr::Lam(_) | Expr::Pi(_))
    }

    pub fn is_meta(&self) -> bool {
        matches!(self, Expr::Meta(_))
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Expr::Local(_))
    }

    pub fn is_const_of(&self, name: &Name) -> bool {
        matches!(self, Expr::Const(inner) if inner.name == *name)
    }

    pub fn const_name(&self) -> Option<&Name> {
        match self {
            Expr::Const(inner) => Some(&inner.name),
            _ => None,
        }
    }

    pub fn as_local(&self) -> Option<&ExprLocal> {
        match self {
            Expr::Local(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }

    pub fn as_meta(&self) -> Option<&ExprMeta> {
        match self {
            Expr::Meta(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }

    /// The binder of a lambda or a pi.
    pub fn binder(&self) -> Option<&Arc<ExprBinder>> {
        match self {
            Expr::Lam(inner) | Expr::Pi(inner) => Some(inner),
            _ => None,
        }
    }

    /// `(f a₁ ⋯ aₙ).head() == f`
    pub fn head(&self) -> &Expr {
        let mut e = self;
        while let Expr::App(inner) = e {
            e = &inner.fun;
        }
        e
    }

    pub fn args(&self) -> Vec<&Expr> {
        let mut e = self;
        let mut args = vec![];
        while let Expr::App(inner) = e {
            args.push(&inner.arg);
            e = &inner.fun;
        }
        args.reverse();
        args
    }

    pub fn num_args(&self) -> usize {
        let mut e = self;
        let mut n = 0;
        while let Expr::App(inner) = e {
            n += 1;
            e = &inner.fun;
        }
        n
    }

    /// Checks if self ≡ (c a₁ ⋯ aₙ) where `c` is the constant `name`.
    pub fn is_app_of(&self, name: &Name, nargs: usize) -> bool {
        self.head().is_const_of(name) && self.num_args() == nargs
    }

    /// Returns the application `self a₁ ⋯ aₙ`.
    pub fn apply(&self, args: impl IntoIterator<Item = Expr>) -> Expr {
        let mut fun = self.clone();
        for arg in args {
            fun = mk_app(fun, arg);
        }
        fun
    }

    /// Rebuilds the term top-down. `f(e, offset)` returns `Some(r)` to replace `e` by `r`,
    /// or `None` to descend into its children; `offset` is the number of binders crossed.
    pub fn replace<F>(&self, f: &mut F) -> Expr
    where
        F: FnMut(&Expr, usize) -> Option<Expr>,
    {
        self.replace_at(f, 0)
    }

    fn replace_at<F>(&self, f: &mut F, offset: usize) -> Expr
    where
        F: FnMut(&Expr, usize) -> Option<Expr>,
    {
        if let Some(e) = f(self, offset) {
            return e;
        }
        match self {
            Expr::Var(_) | Expr::Sort(_) | Expr::Const(_) | Expr::Local(_) | Expr::Meta(_) => {
                self.clone()
            }
            Expr::App(inner) => {
                let fun = inner.fun.replace_at(f, offset);
                let arg = inner.arg.replace_at(f, offset);
                if inner.fun.ptr_eq(&fun) && inner.arg.ptr_eq(&arg) {
                    self.clone()
                } else {
                    mk_app(fun, arg)
                }
            }
            Expr::Lam(inner) | Expr::Pi(inner) => {
                let binder_type = inner.binder_type.replace_at(f, offset);
                let body = inner.body.replace_at(f, offset + 1);
                if inner.binder_type.ptr_eq(&binder_type) && inner.body.ptr_eq(&body) {
                    self.clone()
                } else if self.is_pi() {
                    mk_pi(inner.binder_name.clone(), inner.binder_info, binder_type, body)
                } else {
                    mk_lambda(inner.binder_name.clone(), inner.binder_info, binder_type, body)
                }
            }
            Expr::Let(inner) => {
                let binder_type = inner.binder_type.replace_at(f, offset);
                let value = inner.value.replace_at(f, offset);
                let body = inner.body.replace_at(f, offset + 1);
                if inner.binder_type.ptr_eq(&binder_type)
                    && inner.value.ptr_eq(&value)
                    && inner.body.ptr_eq(&body)
                {
                    self.clone()
                } else {
                    mk_let(inner.binder_name.clone(), binder_type, value, body)
                }
            }
            Expr::Macro(inner) => {
                let args: Vec<Expr> = inner.args.iter().map(|arg| arg.replace_at(f, offset)).collect();
                if args.iter().zip(&inner.args).all(|(a, b)| a.ptr_eq(b)) {
                    self.clone()
                } else {
                    mk_macro(inner.def.clone(), args)
                }
            }
        }
    }

    /// Visits subterms top-down. Children are skipped when `f` returns false.
    pub fn for_each<F>(&self, f: &mut F)
    where
        F: FnMut(&Expr, usize) -> bool,
    {
        self.for_each_at(f, 0)
    }

    fn for_each_at<F>(&self, f: &mut F, offset: usize)
    where
        F: FnMut(&Expr, usize) -> bool,
    {
        if !f(self, offset) {
            return;
        }
        match self {
            Expr::Var(_) | Expr::Sort(_) | Expr::Const(_) | Expr::Local(_) | Expr::Meta(_) => {}
            Expr::App(inner) => {
                inner.fun.for_each_at(f, offset);
                inner.arg.for_each_at(f, offset);
            }
            Expr::Lam(inner) | Expr::Pi(inner) => {
                inner.binder_type.for_each_at(f, offset);
                inner.body.for_each_at(f, offset + 1);
            }
            Expr::Let(inner) => {
                inner.binder_type.for_each_at(f, offset);
                inner.value.for_each_at(f, offset);
                inner.body.for_each_at(f, offset + 1);
            }
            Expr::Macro(inner) => {
                for arg in &inner.args {
                    arg.for_each_at(f, offset);
                }
            }
        }
    }

    /// Returns the first subterm (in pre-order) satisfying `pred`.
    pub fn find<F>(&self, pred: &mut F) -> Option<Expr>
    where
        F: FnMut(&Expr, usize) -> bool,
    {
        let mut result = None;
        self.for_each(&mut |e, offset| {
            if result.is_some() {
                return false;
            }
            if pred(e, offset) {
                result = Some(e.clone());
                return false;
            }
            true
        });
        result
    }

    /// Checks if `needle` occurs in self as a subterm.
    pub fn occurs(&self, needle: &Expr) -> bool {
        self.find(&mut |e, _| e == needle).is_some()
    }

    pub fn has_loose_var(&self, index: usize) -> bool {
        if self.metadata().bound <= index {
            return false;
        }
        self.find(&mut |e, offset| matches!(e, Expr::Var(v) if v.index == index + offset))
            .is_some()
    }

    /// Replaces the loose bound variables `#0 ⋯ #(n-1)` with `xs[n-1] ⋯ xs[0]`.
    /// The remaining loose variables are lowered by `n`.
    pub fn instantiate(&self, xs: &[Expr]) -> Expr {
        if xs.is_empty() || !self.has_loose_vars() {
            return self.clone();
        }
        let n = xs.len();
        self.replace(&mut |e, offset| {
            if e.metadata().bound <= offset {
                return Some(e.clone());
            }
            let Expr::Var(var) = e else {
                return None;
            };
            let i = var.index - offset;
            if i < n {
                Some(xs[n - i - 1].lift_loose(offset))
            } else {
                Some(mk_var(var.index - n))
            }
        })
    }

    pub fn instantiate1(&self, x: &Expr) -> Expr {
        self.instantiate(std::slice::from_ref(x))
    }

    /// Shifts every loose bound variable by `shift`.
    pub fn lift_loose(&self, shift: usize) -> Expr {
        if shift == 0 || !self.has_loose_vars() {
            return self.clone();
        }
        self.replace(&mut |e, offset| {
            if e.metadata().bound <= offset {
                return Some(e.clone());
            }
            match e {
                Expr::Var(var) => Some(mk_var(var.index + shift)),
                _ => None,
            }
        })
    }

    /// Turns the locals `x₁ ⋯ xₙ` into the loose bound variables `#(n-1) ⋯ #0`.
    pub fn abstract_locals(&self, ids: &[Id]) -> Expr {
        if ids.is_empty() {
            return self.clone();
        }
        let n = ids.len();
        self.replace(&mut |e, offset| {
            if !e.metadata().has_local {
                return Some(e.clone());
            }
            let Expr::Local(local) = e else {
                return None;
            };
            match ids.iter().rposition(|&id| id == local.id) {
                Some(pos) => Some(mk_var(offset + n - pos - 1)),
                None => Some(e.clone()),
            }
        })
    }

    pub fn replace_levels(&self, f: &impl Fn(&Level) -> Level) -> Expr {
        self.replace(&mut |e, _| match e {
            Expr::Sort(inner) => Some(mk_sort(f(&inner.level))),
            Expr::Const(inner) if !inner.levels.is_empty() => Some(mk_const(
                inner.name.clone(),
                inner.levels.iter().map(f).collect(),
            )),
            Expr::Const(_) => Some(e.clone()),
            _ => None,
        })
    }

    pub fn instantiate_univ_params(&self, params: &[Name], levels: &[Level]) -> Expr {
        if params.is_empty() {
            return self.clone();
        }
        self.replace_levels(&|l| l.instantiate(params, levels))
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const PREC_BINDER: u8 = 0;
        const PREC_APP: u8 = 1;
        const PREC_ATOM: u8 = 2;

        fn fmt_binder(
            name: &Name,
            info: BinderInfo,
            ty: &Expr,
            f: &mut std::fmt::Formatter<'_>,
            names: &mut Vec<Name>,
        ) -> std::fmt::Result {
            let (open, close) = match info {
                BinderInfo::Default => ("(", ")"),
                BinderInfo::Implicit => ("{", "}"),
                BinderInfo::StrictImplicit => ("⦃", "⦄"),
                BinderInfo::InstImplicit => ("[", "]"),
            };
            write!(f, "{open}{name} : ")?;
            fmt_expr(ty, f, PREC_BINDER, names)?;
            write!(f, "{close}")
        }

        fn fmt_expr(
            e: &Expr,
            f: &mut std::fmt::Formatter<'_>,
            prec: u8,
            names: &mut Vec<Name>,
        ) -> std::fmt::Result {
            match e {
                Expr::Var(inner) => match names.len().checked_sub(inner.index + 1) {
                    Some(i) => write!(f, "{}", names[i]),
                    None => write!(f, "#{}", inner.index),
                },
                Expr::Sort(inner) => match inner.level.to_offset() {
                    (Level::Zero, 0) => write!(f, "Prop"),
                    (Level::Zero, 1) => write!(f, "Type"),
                    _ if prec >= PREC_ATOM => write!(f, "(Sort {})", inner.level),
                    _ => write!(f, "Sort {}", inner.level),
                },
                Expr::Const(inner) => write!(f, "{}", inner.name),
                Expr::Local(inner) => write!(f, "{}", inner.name),
                Expr::Meta(inner) => write!(f, "?{}", inner.name),
                Expr::App(_) => {
                    if prec >= PREC_ATOM {
                        write!(f, "(")?;
                    }
                    fmt_expr(e.head(), f, PREC_APP, names)?;
                    for arg in e.args() {
                        write!(f, " ")?;
                        fmt_expr(arg, f, PREC_ATOM, names)?;
                    }
                    if prec >= PREC_ATOM {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
                Expr::Lam(inner) | Expr::Pi(inner) => {
                    if prec > PREC_BINDER {
                        write!(f, "(")?;
                    }
                    let arrow = e.is_pi()
                        && inner.binder_info.is_explicit()
                        && !inner.body.has_loose_var(0);
                    if arrow {
                        fmt_expr(&inner.binder_type, f, PREC_APP, names)?;
                        write!(f, " → ")?;
                    } else {
                        write!(f, "{} ", if e.is_pi() { "∀" } else { "λ" })?;
                        fmt_binder(
                            &inner.binder_name,
                            inner.binder_info,
                            &inner.binder_type,
                            f,
                            names,
                        )?;
                        write!(f, ", ")?;
                    }
                    names.push(inner.binder_name.clone());
                    let res = fmt_expr(&inner.body, f, PREC_BINDER, names);
                    names.pop();
                    res?;
                    if prec > PREC_BINDER {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
                Expr::Let(inner) => {
                    if prec > PREC_BINDER {
                        write!(f, "(")?;
                    }
                    write!(f, "let {} : ", inner.binder_name)?;
                    fmt_expr(&inner.binder_type, f, PREC_BINDER, names)?;
                    write!(f, " := ")?;
                    fmt_expr(&inner.value, f, PREC_BINDER, names)?;
                    write!(f, " in ")?;
                    names.push(inner.binder_name.clone());
                    let res = fmt_expr(&inner.body, f, PREC_BINDER, names);
                    names.pop();
                    res?;
                    if prec > PREC_BINDER {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
                Expr::Macro(inner) => {
                    write!(f, "[{}", inner.def)?;
                    for arg in &inner.args {
                        write!(f, " ")?;
                        fmt_expr(arg, f, PREC_ATOM, names)?;
                    }
                    write!(f, "]")
                }
            }
        }

        fmt_expr(self, f, PREC_BINDER, &mut vec![])
    }
}
