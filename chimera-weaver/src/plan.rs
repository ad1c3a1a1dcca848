//! 执行计划（Execution Plan）
//!
//! 为一个 Target（加上可选的通知过滤器）收集所有已启用切面中匹配的通知，
//! 按阶段分组并排序，产出可重复使用的 [`ExecutionPlan`]。
//!
//! 排序规则：优先级数值小的在前；优先级相同则按切面启用顺序、再按声明顺序。
//! 环绕通知以 `around[0]` 为最外层嵌套

use crate::advice::{Advice, BoundAdvice};
use crate::aspect::AspectInstance;
use crate::context::{AdviceContext, CompileContext};
use crate::constants::COMPILE_DESCRIPTOR_MISMATCH;
use crate::descriptor::Compiled;
use crate::error::{AdviceError, WeaverError, WeaverResult};
use crate::hooks::{forbid_return, WeaverHooks};
use crate::joinpoint::{JoinPoint, OriginalFn};
use crate::pointcut::{AdvicePhase, JoinPointKind, Pointcut};
use crate::registry::AdviceRegistry;
use crate::target::{TargetKey, TargetRef, TargetRegistry};
use crate::value::{ObjectRef, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 通知过滤器
///
/// 同一个属性 Target 会分别为 getter 和 setter 建立执行计划
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdviceFilter {
    All,
    Getter,
    Setter,
}

impl AdviceFilter {
    pub fn accepts(&self, pointcut: &Pointcut) -> bool {
        match self {
            AdviceFilter::All => true,
            AdviceFilter::Getter => pointcut.kind() != JoinPointKind::Property || pointcut.is_getter(),
            AdviceFilter::Setter => pointcut.kind() != JoinPointKind::Property || pointcut.is_setter(),
        }
    }
}

/// 执行计划
pub struct ExecutionPlan {
    target: TargetRef,
    filter: AdviceFilter,
    compile: Vec<BoundAdvice>,
    before: Vec<BoundAdvice>,
    around: Vec<BoundAdvice>,
    after_return: Vec<BoundAdvice>,
    after_throw: Vec<BoundAdvice>,
    after: Vec<BoundAdvice>,
}

impl ExecutionPlan {
    fn new(target: TargetRef, filter: AdviceFilter, advices: Vec<BoundAdvice>) -> Self {
        let mut plan = Self {
            target,
            filter,
            compile: Vec::new(),
            before: Vec::new(),
            around: Vec::new(),
            after_return: Vec::new(),
            after_throw: Vec::new(),
            after: Vec::new(),
        };

        for advice in advices {
            let phase = match advice.advice().phase() {
                AdvicePhase::Compile => &mut plan.compile,
                AdvicePhase::Before => &mut plan.before,
                AdvicePhase::Around => &mut plan.around,
                AdvicePhase::AfterReturn => &mut plan.after_return,
                AdvicePhase::AfterThrow => &mut plan.after_throw,
                AdvicePhase::After => &mut plan.after,
            };
            phase.push(advice);
        }
        plan
    }

    pub fn target(&self) -> &TargetRef {
        &self.target
    }

    pub fn filter(&self) -> AdviceFilter {
        self.filter
    }

    pub fn compile_advices(&self) -> &[BoundAdvice] {
        &self.compile
    }

    pub fn before_advices(&self) -> &[BoundAdvice] {
        &self.before
    }

    pub fn around_advices(&self) -> &[BoundAdvice] {
        &self.around
    }

    pub fn after_return_advices(&self) -> &[BoundAdvice] {
        &self.after_return
    }

    pub fn after_throw_advices(&self) -> &[BoundAdvice] {
        &self.after_throw
    }

    pub fn after_advices(&self) -> &[BoundAdvice] {
        &self.after
    }

    pub fn len(&self) -> usize {
        self.compile.len()
            + self.before.len()
            + self.around.len()
            + self.after_return.len()
            + self.after_throw.len()
            + self.after.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 依次执行 Compile 通知
    ///
    /// 每个通知都能看到上一个通知的产物，并可以再次替换它
    pub fn compile(&self, hooks: &dyn WeaverHooks, original: Compiled) -> WeaverResult<Compiled> {
        let mut ctxt = CompileContext::new(self.target.clone(), original);
        for advice in &self.compile {
            if let Some(compiled) = advice.invoke_compile(&mut ctxt)? {
                if !hooks.accepts(&compiled) {
                    return Err(AdviceError::new(advice.advice(), COMPILE_DESCRIPTOR_MISMATCH).into());
                }
                ctxt.replace(compiled);
            }
        }
        Ok(ctxt.into_compiled())
    }

    /// 编译原始代码并产出织入后的可调用对象
    pub fn execute(
        self: &Arc<Self>,
        hooks: Arc<dyn WeaverHooks>,
        original: Compiled,
    ) -> WeaverResult<WovenCallable> {
        let compiled = self.compile(hooks.as_ref(), original)?;
        Ok(WovenCallable {
            plan: self.clone(),
            hooks,
            compiled,
        })
    }
}

impl fmt::Debug for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionPlan")
            .field("target", &self.target.reference())
            .field("filter", &self.filter)
            .field("compile", &self.compile)
            .field("before", &self.before)
            .field("around", &self.around)
            .field("after_return", &self.after_return)
            .field("after_throw", &self.after_throw)
            .field("after", &self.after)
            .finish()
    }
}

/// 织入后的可调用对象
///
/// 持有编译后的原始代码；每次 [`WovenCallable::invoke`] 都是一次独立的连接点调用，
/// 拥有自己的 [`AdviceContext`]
#[derive(Clone)]
pub struct WovenCallable {
    plan: Arc<ExecutionPlan>,
    hooks: Arc<dyn WeaverHooks>,
    compiled: Compiled,
}

impl WovenCallable {
    pub fn plan(&self) -> &Arc<ExecutionPlan> {
        &self.plan
    }

    pub fn compiled(&self) -> &Compiled {
        &self.compiled
    }

    /// 执行一次连接点调用
    ///
    /// `BEFORE → AROUND → ORIGINAL → (AFTER_RETURN | AFTER_THROW) → AFTER`
    pub fn invoke(&self, instance: Option<ObjectRef>, args: Vec<Value>) -> WeaverResult<Value> {
        let hooks = self.hooks.as_ref();
        let mut ctxt = hooks.create_context(self.plan.target.clone(), instance, args)?;
        let original = |ctxt: &mut AdviceContext| hooks.invoke_original(&self.compiled, ctxt);

        let outcome = match self.run(&mut ctxt, &original) {
            Ok(_) => self.after_return(&mut ctxt),
            // 框架错误不交给 AfterThrow
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => self.after_throw(&mut ctxt, error),
        };
        if let Err(error) = &outcome {
            ctxt.error = Some(error.clone());
        }

        // finally：After 通知在任何结果下都会执行
        for advice in &self.plan.after {
            let returned = advice.invoke(&mut ctxt)?;
            forbid_return(advice, &returned)?;
        }
        outcome?;

        hooks.finish(&mut ctxt)
    }

    fn run(&self, ctxt: &mut AdviceContext, original: &OriginalFn<'_>) -> WeaverResult<Value> {
        for advice in &self.plan.before {
            let returned = advice.invoke(ctxt)?;
            forbid_return(advice, &returned)?;
        }

        JoinPoint::new(&self.plan.around, original, self.hooks.as_ref()).proceed(ctxt)
    }

    fn after_return(&self, ctxt: &mut AdviceContext) -> WeaverResult<()> {
        for advice in &self.plan.after_return {
            let returned = advice.invoke(ctxt)?;
            self.hooks.after_returned(advice, ctxt, returned)?;
        }
        Ok(())
    }

    fn after_throw(&self, ctxt: &mut AdviceContext, error: WeaverError) -> WeaverResult<()> {
        ctxt.error = Some(error.clone());
        if self.plan.after_throw.is_empty() {
            return Err(error);
        }

        for advice in &self.plan.after_throw {
            let returned = advice.invoke(ctxt)?;
            self.hooks.after_thrown(advice, ctxt, returned)?;
        }
        Ok(())
    }
}

impl fmt::Debug for WovenCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WovenCallable")
            .field("target", &self.plan.target.reference())
            .field("hooks", &self.hooks.name())
            .field("compiled", &self.compiled)
            .finish()
    }
}

/// 已启用切面中的一个通知
#[derive(Clone)]
struct Candidate {
    advice: Arc<Advice>,
    aspect: AspectInstance,
    priority: i32,
    /// (切面启用顺序, 声明顺序)
    order: (usize, usize),
}

/// 已启用的切面
struct EnabledAspect {
    id: String,
    instance: AspectInstance,
    advices: Vec<Candidate>,
}

/// 执行计划工厂
pub struct PlanFactory {
    registry: Arc<AdviceRegistry>,
    targets: Arc<TargetRegistry>,
    aspects: Vec<EnabledAspect>,
    index: HashMap<JoinPointKind, Vec<Candidate>>,
    plans: Mutex<HashMap<(TargetKey, AdviceFilter), Arc<ExecutionPlan>>>,
}

impl PlanFactory {
    pub fn new(registry: Arc<AdviceRegistry>, targets: Arc<TargetRegistry>) -> Self {
        Self {
            registry,
            targets,
            aspects: Vec::new(),
            index: HashMap::new(),
            plans: Mutex::new(HashMap::new()),
        }
    }

    /// 启用切面；相同 id 的切面在原位置被替换
    pub fn enable<I>(&mut self, aspects: I) -> WeaverResult<()>
    where
        I: IntoIterator<Item = AspectInstance>,
    {
        for aspect in aspects {
            let metadata = self.registry.metadata(&aspect)?;
            let id = self.registry.resolve_id(&aspect)?;
            let advices = self
                .registry
                .get_advices_by_aspect(&aspect)?
                .into_iter()
                .enumerate()
                .map(|(position, advice)| Candidate {
                    order: (0, position),
                    priority: advice
                        .pointcut()
                        .options()
                        .priority
                        .or(metadata.priority())
                        .unwrap_or(0),
                    advice,
                    aspect: aspect.clone(),
                })
                .collect();

            let entry = EnabledAspect {
                id,
                instance: aspect,
                advices,
            };
            match self.aspects.iter_mut().find(|existing| existing.id == entry.id) {
                Some(existing) => *existing = entry,
                None => self.aspects.push(entry),
            }
        }
        self.reindex();
        Ok(())
    }

    /// 禁用切面（按 id）
    pub fn disable<I>(&mut self, aspects: I) -> WeaverResult<()>
    where
        I: IntoIterator<Item = AspectInstance>,
    {
        for aspect in aspects {
            let id = self.registry.resolve_id(&aspect)?;
            self.aspects.retain(|existing| existing.id != id);
        }
        self.reindex();
        Ok(())
    }

    /// 已启用的切面实例
    pub fn aspects(&self) -> impl Iterator<Item = &AspectInstance> {
        self.aspects.iter().map(|aspect| &aspect.instance)
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (aspect_order, aspect) in self.aspects.iter().enumerate() {
            for candidate in &aspect.advices {
                let mut candidate = candidate.clone();
                candidate.order.0 = aspect_order;
                self.index
                    .entry(candidate.advice.pointcut().kind())
                    .or_default()
                    .push(candidate);
            }
        }
        self.plans.lock().clear();
    }

    /// 获取（或创建并缓存）Target 的执行计划
    ///
    /// 参数 Target 使用所属方法的执行计划
    pub fn create(&self, target: &TargetRef, filter: AdviceFilter) -> WeaverResult<Arc<ExecutionPlan>> {
        let target = match target.kind() {
            JoinPointKind::Parameter => target.parent().cloned().ok_or_else(|| {
                WeaverError::weaving(format!("{} has no declaring method", target.label()))
            })?,
            _ => target.clone(),
        };

        let key = (target.key().clone(), filter);
        if let Some(plan) = self.plans.lock().get(&key) {
            return Ok(plan.clone());
        }

        let plan = Arc::new(ExecutionPlan::new(
            target.clone(),
            filter,
            self.collect(&target, filter),
        ));
        tracing::debug!(
            "Created execution plan for {} ({:?}): {} advice(s)",
            target.label(),
            filter,
            plan.len()
        );

        Ok(self.plans.lock().entry(key).or_insert(plan).clone())
    }

    /// 丢弃缓存的执行计划
    pub fn invalidate(&self, target: &TargetRef) {
        self.plans.lock().retain(|(key, _), _| key != target.key());
    }

    fn collect(&self, target: &TargetRef, filter: AdviceFilter) -> Vec<BoundAdvice> {
        let kinds: &[JoinPointKind] = match target.kind() {
            JoinPointKind::Class => &[JoinPointKind::Class],
            JoinPointKind::Property => &[JoinPointKind::Property],
            JoinPointKind::Method | JoinPointKind::Parameter => {
                &[JoinPointKind::Method, JoinPointKind::Parameter]
            }
        };

        // (优先级, 切面启用顺序, 声明顺序)
        let mut matched: Vec<((i32, usize, usize), BoundAdvice)> = Vec::new();
        for kind in kinds {
            let Some(candidates) = self.index.get(kind) else {
                continue;
            };

            for candidate in candidates {
                let pointcut = candidate.advice.pointcut();
                if !filter.accepts(pointcut) || !pointcut.matches_member(target) {
                    continue;
                }

                // 参数切点只判断方法上是否有被注解的参数，每个方法只绑定一次，
                // 绑定下标最小的那个参数上的注解
                let annotations: Vec<_> = match pointcut.kind() {
                    JoinPointKind::Parameter => self
                        .targets
                        .parameters_of(target)
                        .iter()
                        .flat_map(|parameter| parameter.annotations_of(pointcut.annotation()))
                        .take(1)
                        .collect(),
                    _ => target.annotations_of(pointcut.annotation()),
                };

                for annotation in annotations {
                    matched.push((
                        (candidate.priority, candidate.order.0, candidate.order.1),
                        BoundAdvice::new(
                            candidate.advice.clone(),
                            candidate.aspect.clone(),
                            annotation,
                            candidate.priority,
                        ),
                    ));
                }
            }
        }

        matched.sort_by_key(|(order, _)| *order);
        matched.into_iter().map(|(_, advice)| advice).collect()
    }
}

impl fmt::Debug for PlanFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanFactory")
            .field(
                "aspects",
                &self.aspects.iter().map(|aspect| aspect.id.as_str()).collect::<Vec<_>>(),
            )
            .field("plans", &self.plans.lock().len())
            .finish()
    }
}
