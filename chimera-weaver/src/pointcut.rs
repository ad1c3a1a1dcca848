//! 切点（Pointcut）表达式系统
//!
//! 表达式文本形如 `<kind>[#get|#set] <annotation> <member>`，例如
//! `class @test:AClass *`、`property#set @test:AProperty *`。
//! [`on`] 构造表达式，[`Pointcut::of`] 把文本解析回结构化切点

use crate::annotation::AnnotationRef;
use crate::constants::POINTCUT_NOT_RECOGNIZED;
use crate::error::{WeaverError, WeaverResult};
use crate::target::Target;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// 连接点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinPointKind {
    Class,
    Property,
    Method,
    Parameter,
}

impl fmt::Display for JoinPointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinPointKind::Class => write!(f, "class"),
            JoinPointKind::Property => write!(f, "property"),
            JoinPointKind::Method => write!(f, "method"),
            JoinPointKind::Parameter => write!(f, "parameter"),
        }
    }
}

/// 通知阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdvicePhase {
    /// 每个声明只执行一次，产出替换后的构造函数或描述符
    Compile,
    /// 前置通知
    Before,
    /// 环绕通知（可以控制是否执行原始代码）
    Around,
    /// 返回后通知（正常返回时执行）
    AfterReturn,
    /// 异常通知（抛出异常时执行）
    AfterThrow,
    /// 后置通知（无论成功还是失败都执行）
    After,
}

impl fmt::Display for AdvicePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdvicePhase::Compile => write!(f, "Compile"),
            AdvicePhase::Before => write!(f, "Before"),
            AdvicePhase::Around => write!(f, "Around"),
            AdvicePhase::AfterReturn => write!(f, "AfterReturn"),
            AdvicePhase::AfterThrow => write!(f, "AfterThrow"),
            AdvicePhase::After => write!(f, "After"),
        }
    }
}

/// 通知选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdviceOptions {
    /// 数值越小越靠外、越先执行
    pub priority: Option<i32>,
}

impl AdviceOptions {
    pub fn priority(priority: i32) -> Self {
        Self {
            priority: Some(priority),
        }
    }
}

/// 切点表达式（未校验的文本）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PointcutExpression(String);

impl PointcutExpression {
    pub fn new(expression: impl Into<String>) -> Self {
        Self(expression.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PointcutExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PointcutExpression {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PointcutExpression {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// 表达式构造器
///
/// ```ignore
/// use chimera_weaver::on;
///
/// let expr = on::property().setter().with_annotation(&APROPERTY);
/// assert_eq!(expr.as_str(), "property#set @test:AProperty *");
/// ```
pub mod on {
    use super::{PointcutExpression, Selector};
    use crate::annotation::AnnotationRef;

    pub fn class() -> Selector {
        Selector::new("class")
    }

    /// 属性 getter；`.setter()` 切换为 setter
    pub fn property() -> PropertySelector {
        PropertySelector {
            selector: Selector::new("property#get"),
        }
    }

    pub fn method() -> Selector {
        Selector::new("method")
    }

    pub fn parameter() -> Selector {
        Selector::new("parameter")
    }

    /// 属性选择器
    #[derive(Debug, Clone)]
    pub struct PropertySelector {
        selector: Selector,
    }

    impl PropertySelector {
        pub fn getter(self) -> Selector {
            self.selector
        }

        pub fn setter(self) -> Selector {
            Selector {
                token: "property#set",
                ..self.selector
            }
        }

        pub fn named(self, pattern: &str) -> Self {
            Self {
                selector: self.selector.named(pattern),
            }
        }

        pub fn with_annotation(self, annotation: &AnnotationRef) -> PointcutExpression {
            self.selector.with_annotation(annotation)
        }

        pub fn with_annotations(self, annotations: &[AnnotationRef]) -> Vec<PointcutExpression> {
            self.selector.with_annotations(annotations)
        }
    }
}

/// 选择器：连接点类型 + 成员名模式
#[derive(Debug, Clone)]
pub struct Selector {
    token: &'static str,
    member: String,
}

impl Selector {
    fn new(token: &'static str) -> Self {
        Self {
            token,
            member: "*".to_string(),
        }
    }

    /// 成员名模式，支持 `*` 通配符
    pub fn named(mut self, pattern: &str) -> Self {
        self.member = pattern.to_string();
        self
    }

    pub fn with_annotation(self, annotation: &AnnotationRef) -> PointcutExpression {
        PointcutExpression(format!("{} {} {}", self.token, annotation, self.member))
    }

    /// 每个注解生成一条表达式
    pub fn with_annotations(self, annotations: &[AnnotationRef]) -> Vec<PointcutExpression> {
        annotations
            .iter()
            .map(|annotation| self.clone().with_annotation(annotation))
            .collect()
    }
}

/// 各连接点类型的语法
static GRAMMARS: Lazy<Vec<(JoinPointKind, Regex)>> = Lazy::new(|| {
    const TAIL: &str = r"\s+(?P<annotation>@[\w.\-]+:[\w$]+)\s+(?P<member>[\w$*]+)\s*$";
    [
        (JoinPointKind::Class, r"^\s*(?P<name>class)"),
        (JoinPointKind::Property, r"^\s*(?P<name>property#(?:get|set))"),
        (JoinPointKind::Method, r"^\s*(?P<name>method)"),
        (JoinPointKind::Parameter, r"^\s*(?P<name>parameter)"),
    ]
    .into_iter()
    .map(|(kind, head)| {
        let regex = Regex::new(&format!("{}{}", head, TAIL)).expect("pointcut grammar is valid");
        (kind, regex)
    })
    .collect()
});

/// 结构化切点
#[derive(Debug, Clone)]
pub struct Pointcut {
    kind: JoinPointKind,
    phase: AdvicePhase,
    annotation: AnnotationRef,
    name: String,
    member: String,
    pattern: MemberPattern,
    reference: String,
    options: AdviceOptions,
}

impl Pointcut {
    /// 解析切点表达式
    pub fn of(
        phase: AdvicePhase,
        expression: &PointcutExpression,
        options: AdviceOptions,
    ) -> WeaverResult<Self> {
        let text = expression.as_str();
        for (kind, grammar) in GRAMMARS.iter() {
            let Some(captures) = grammar.captures(text) else {
                continue;
            };

            let annotation = captures["annotation"]
                .parse::<AnnotationRef>()
                .map_err(WeaverError::Weaving)?;
            let name = captures["name"].to_string();
            let member = captures["member"].to_string();
            let pattern = MemberPattern::new(&member)?;
            let reference = format!("{}({} {} {})", phase, name, annotation, member);

            return Ok(Self {
                kind: *kind,
                phase,
                annotation,
                name,
                member,
                pattern,
                reference,
                options,
            });
        }

        Err(WeaverError::weaving(format!(
            "expression \"{}\" {}",
            text, POINTCUT_NOT_RECOGNIZED
        )))
    }

    pub fn kind(&self) -> JoinPointKind {
        self.kind
    }

    pub fn phase(&self) -> AdvicePhase {
        self.phase
    }

    pub fn annotation(&self) -> &AnnotationRef {
        &self.annotation
    }

    /// 选择器名称：`class`、`property#get`、`property#set`、`method`、`parameter`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 成员名模式
    pub fn member(&self) -> &str {
        &self.member
    }

    /// 稳定引用，例如 `Before(class @test:AClass *)`
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn options(&self) -> &AdviceOptions {
        &self.options
    }

    pub fn is_getter(&self) -> bool {
        self.name == "property#get"
    }

    pub fn is_setter(&self) -> bool {
        self.name == "property#set"
    }

    /// 成员名是否匹配
    pub fn matches_member(&self, target: &Target) -> bool {
        self.pattern.matches(target.member_name())
    }
}

impl PartialEq for Pointcut {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
    }
}

impl Eq for Pointcut {}

impl fmt::Display for Pointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference)
    }
}

/// 成员名模式（支持 * 通配符），解析切点时编译
///
/// 支持的模式：
/// - `*` - 匹配任意字符串
/// - `get*` - 以 get 开头
/// - `*Label` - 以 Label 结尾
/// - `*abel*` - 包含 abel
#[derive(Debug, Clone)]
enum MemberPattern {
    Any,
    Exact(String),
    Glob(Regex),
}

impl MemberPattern {
    fn new(pattern: &str) -> WeaverResult<Self> {
        if pattern == "*" {
            return Ok(MemberPattern::Any);
        }

        if !pattern.contains('*') {
            return Ok(MemberPattern::Exact(pattern.to_string()));
        }

        let regex_pattern = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");

        Regex::new(&format!("^{}$", regex_pattern))
            .map(MemberPattern::Glob)
            .map_err(|e| {
                WeaverError::weaving(format!("invalid member pattern {}: {}", pattern, e))
            })
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            MemberPattern::Any => true,
            MemberPattern::Exact(exact) => exact == name,
            MemberPattern::Glob(regex) => regex.is_match(name),
        }
    }
}
