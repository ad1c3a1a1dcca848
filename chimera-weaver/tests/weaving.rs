//! 织入流程的端到端测试

use chimera_weaver::constants::{
    CANNOT_CALL_CONSTRUCTOR_AFTER_INSTANCE_USED, CANNOT_GET_THIS_BEFORE_JOINPOINT,
    COMPILE_DESCRIPTOR_MISMATCH, COMPILE_ON_SETTER_NOT_SUPPORTED, POINTCUT_NOT_RECOGNIZED,
    RETURNING_FROM_ADVICE_NOT_SUPPORTED, RETURNING_NON_INSTANCE_FROM_CLASS_ADVICE,
    WEAVER_ALREADY_LOADED,
};
use chimera_weaver::prelude::*;
use chimera_weaver::{
    AdviceData, AdviceOptions, AdvicePhase, Fields, JoinPointKind, Pointcut, PointcutExpression,
    TargetRef, WeaverConfig, Woven,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const ACLASS: AnnotationRef = AnnotationRef::of("test", "AClass");
const BCLASS: AnnotationRef = AnnotationRef::of("test", "BClass");
const APROPERTY: AnnotationRef = AnnotationRef::of("test", "AProperty");
const AMETHOD: AnnotationRef = AnnotationRef::of("test", "AMethod");
const AARG: AnnotationRef = AnnotationRef::of("test", "AArg");

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().clone()
}

/// `constructor(...labels) { this.labels = labels }`
fn labels_constructor() -> Constructor {
    Constructor::new(|args| {
        let labels: Vec<serde_json::Value> =
            args.iter().filter_map(Value::as_str).map(|label| json!(label)).collect();
        let mut fields = Fields::new();
        fields.insert("labels".to_string(), Value::from(json!(labels)));
        Ok(fields)
    })
}

fn labels(instance: &ObjectRef) -> Vec<String> {
    instance
        .get_json("labels")
        .and_then(|labels| labels.as_array().cloned())
        .unwrap_or_default()
        .iter()
        .filter_map(|label| label.as_str().map(str::to_string))
        .collect()
}

fn annotated_class(context: &WeaverContext, name: &str, annotations: &[AnnotationRef]) -> TargetRef {
    let target = context.targets().class(name);
    for annotation in annotations {
        target.annotate(annotation.annotation());
    }
    target
}

// ---------------------------------------------------------------------------
// 共享数据
// ---------------------------------------------------------------------------

struct DataAspect {
    seen: Arc<Mutex<Vec<AdviceData>>>,
}

fn record_data(aspect: &DataAspect, ctxt: &AdviceContext) -> WeaverResult<Value> {
    if let Some(annotation) = ctxt.annotation() {
        ctxt.data().push("labels", annotation.reference().name().to_string());
    }
    aspect.seen.lock().push(ctxt.data().clone());
    Ok(Value::Undefined)
}

#[test]
fn test_data_is_shared_within_one_invocation() {
    let context = WeaverContext::new();
    AspectBuilder::<DataAspect>::new("DataAspect")
        .before(Before::new(on::class().with_annotations(&[ACLASS, BCLASS])), "before", record_data)
        .after_return(
            AfterReturn::new(on::class().with_annotations(&[ACLASS, BCLASS])),
            "afterReturn",
            record_data,
        )
        .register(context.registry())
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    context
        .weaver()
        .enable_aspect(DataAspect { seen: seen.clone() })
        .unwrap();

    let a = annotated_class(&context, "A", &[ACLASS, BCLASS]);
    let b = annotated_class(&context, "B", &[ACLASS]);
    let woven_a = context.weaver().enhance_class(&a, Constructor::empty()).unwrap();
    let woven_b = context.weaver().enhance_class(&b, Constructor::empty()).unwrap();

    woven_a.construct(vec![]).unwrap();
    {
        let seen = seen.lock();
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|data| data.ptr_eq(&seen[0])));
        assert_eq!(
            seen[0].get("labels"),
            Some(json!(["AClass", "BClass", "AClass", "BClass"]))
        );
    }

    woven_a.construct(vec![]).unwrap();
    woven_b.construct(vec![]).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 10);
    assert!(!seen[4].ptr_eq(&seen[0]));
    assert!(seen[4..8].iter().all(|data| data.ptr_eq(&seen[4])));
    assert!(!seen[8].ptr_eq(&seen[4]));
    assert!(seen[9].ptr_eq(&seen[8]));
}

struct DataTrail {
    seen: Arc<Mutex<Vec<AdviceData>>>,
}

fn trail(aspect: &DataTrail, ctxt: &AdviceContext, step: &str) -> WeaverResult<Value> {
    ctxt.data().push("steps", step);
    aspect.seen.lock().push(ctxt.data().clone());
    Ok(Value::Undefined)
}

fn enable_trail(context: &WeaverContext) -> Arc<Mutex<Vec<AdviceData>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    context
        .weaver()
        .enable_aspect(DataTrail { seen: seen.clone() })
        .unwrap();
    seen
}

#[test]
fn test_data_is_shared_within_one_property_access() {
    let context = WeaverContext::new();
    AspectBuilder::<DataTrail>::new("DataTrail")
        .before(Before::on(on::property().with_annotation(&APROPERTY)), "beforeGet", |a, c| {
            trail(a, c, "beforeGet")
        })
        .after(After::on(on::property().with_annotation(&APROPERTY)), "afterGet", |a, c| {
            trail(a, c, "afterGet")
        })
        .before(
            Before::on(on::property().setter().with_annotation(&APROPERTY)),
            "beforeSet",
            |a, c| trail(a, c, "beforeSet"),
        )
        .after(
            After::on(on::property().setter().with_annotation(&APROPERTY)),
            "afterSet",
            |a, c| trail(a, c, "afterSet"),
        )
        .register(context.registry())
        .unwrap();
    let seen = enable_trail(&context);

    let weave = |name: &str| {
        let target = context.targets().property("A", name);
        target.annotate(APROPERTY.annotation());
        context
            .weaver()
            .enhance_property(&target, PropertyDescriptor::field(name))
            .unwrap()
    };
    let name = weave("name");
    let title = weave("title");
    let instance = Object::new("A");

    name.get(&instance).unwrap();
    name.get(&instance).unwrap();
    name.set(&instance, "chimera").unwrap();
    title.get(&instance).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 8);
    // 同一次访问内共享
    for pair in seen.chunks(2) {
        assert!(pair[0].ptr_eq(&pair[1]));
    }
    assert_eq!(seen[0].get("steps"), Some(json!(["beforeGet", "afterGet"])));
    assert_eq!(seen[4].get("steps"), Some(json!(["beforeSet", "afterSet"])));
    // 不同次访问、getter 与 setter、不同属性之间互不共享
    for (i, a) in [0, 2, 4, 6].iter().enumerate() {
        for b in [0, 2, 4, 6].iter().skip(i + 1) {
            assert!(!seen[*a].ptr_eq(&seen[*b]), "access {} shares data with {}", a, b);
        }
    }
}

#[test]
fn test_data_is_shared_within_one_method_call() {
    let context = WeaverContext::new();
    AspectBuilder::<DataTrail>::new("DataTrail")
        .before(Before::on(on::method().with_annotation(&AMETHOD)), "before", |a, c| {
            trail(a, c, "before")
        })
        .around(Around::on(on::method().with_annotation(&AMETHOD)), "around", |a, c, jp| {
            trail(a, c, "around")?;
            jp.proceed(c)
        })
        .after_return(
            AfterReturn::on(on::method().with_annotation(&AMETHOD)),
            "afterReturn",
            |a, c| trail(a, c, "afterReturn"),
        )
        .register(context.registry())
        .unwrap();
    let seen = enable_trail(&context);

    let weave = |name: &str| {
        let target = context.targets().method("A", name);
        target.annotate(AMETHOD.annotation());
        context
            .weaver()
            .enhance_method(&target, Method::new(|_, _| Ok(Value::Undefined)))
            .unwrap()
    };
    let run = weave("run");
    let stop = weave("stop");
    let instance = Object::new("A");

    run.invoke(&instance, vec![]).unwrap();
    run.invoke(&instance, vec![]).unwrap();
    stop.invoke(&instance, vec![]).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 9);
    for call in seen.chunks(3) {
        assert!(call.iter().all(|data| data.ptr_eq(&call[0])));
    }
    assert_eq!(
        seen[0].get("steps"),
        Some(json!(["before", "around", "afterReturn"]))
    );
    assert!(!seen[3].ptr_eq(&seen[0]));
    assert!(!seen[6].ptr_eq(&seen[0]));
    assert!(!seen[6].ptr_eq(&seen[3]));
}

// ---------------------------------------------------------------------------
// 排序
// ---------------------------------------------------------------------------

struct AroundA {
    log: Log,
}

struct AroundB {
    log: Log,
}

#[test]
fn test_around_advices_nest_by_priority() {
    let context = WeaverContext::new();
    AspectBuilder::<AroundA>::new(AspectOptions::id("AroundA").with_priority(10))
        .around(Around::on(on::class().with_annotation(&ACLASS)), "around", |aspect, ctxt, jp| {
            aspect.log.lock().push("beforeA".to_string());
            let value = jp.proceed(ctxt)?;
            aspect.log.lock().push("afterA".to_string());
            Ok(value)
        })
        .register(context.registry())
        .unwrap();
    AspectBuilder::<AroundB>::new(AspectOptions::id("AroundB").with_priority(11))
        .around(Around::on(on::class().with_annotation(&ACLASS)), "around", |aspect, ctxt, jp| {
            aspect.log.lock().push("beforeB".to_string());
            let value = jp.proceed(ctxt)?;
            aspect.log.lock().push("afterB".to_string());
            Ok(value)
        })
        .register(context.registry())
        .unwrap();

    let log = new_log();
    // 启用顺序与优先级相反
    context
        .weaver()
        .enable([
            AspectInstance::new(AroundB { log: log.clone() }),
            AspectInstance::new(AroundA { log: log.clone() }),
        ])
        .unwrap();

    let ctor_log = log.clone();
    let constructor = Constructor::new(move |_| {
        ctor_log.lock().push("ctor".to_string());
        Ok(Fields::new())
    });
    let target = annotated_class(&context, "A", &[ACLASS]);
    let woven = context.weaver().enhance_class(&target, constructor).unwrap();

    let instance = woven.construct(vec![]).unwrap();
    assert!(instance.is_instance_of("A"));
    assert_eq!(entries(&log), ["beforeA", "beforeB", "ctor", "afterB", "afterA"]);
}

struct OrderAspect {
    log: Log,
}

#[test]
fn test_advice_priority_overrides_declaration_order() {
    let context = WeaverContext::new();
    AspectBuilder::<OrderAspect>::new("OrderAspect")
        .before(
            Before::on(on::method().with_annotation(&AMETHOD)).priority(5),
            "second",
            |aspect, _| {
                aspect.log.lock().push("second".to_string());
                Ok(Value::Undefined)
            },
        )
        .before(
            Before::on(on::method().with_annotation(&AMETHOD)).priority(1),
            "first",
            |aspect, _| {
                aspect.log.lock().push("first".to_string());
                Ok(Value::Undefined)
            },
        )
        .before(Before::on(on::method().with_annotation(&AMETHOD)), "default", |aspect, _| {
            aspect.log.lock().push("default".to_string());
            Ok(Value::Undefined)
        })
        .register(context.registry())
        .unwrap();

    let log = new_log();
    context.weaver().enable_aspect(OrderAspect { log: log.clone() }).unwrap();

    let target = context.targets().method("A", "run");
    target.annotate(AMETHOD.annotation());
    let woven = context
        .weaver()
        .enhance_method(&target, Method::new(|_, _| Ok(Value::Undefined)))
        .unwrap();

    woven.invoke(&Object::new("A"), vec![]).unwrap();
    assert_eq!(entries(&log), ["default", "first", "second"]);
}

// ---------------------------------------------------------------------------
// 实例身份
// ---------------------------------------------------------------------------

struct LabelAspect;

fn declare_label_aspect(context: &WeaverContext) {
    AspectBuilder::<LabelAspect>::new("LabelAspect")
        .after_return(
            AfterReturn::on(on::class().with_annotation(&ACLASS)),
            "afterReturn",
            |_, ctxt| {
                ctxt.instance()?.push("labels", "AClass");
                Ok(Value::Undefined)
            },
        )
        .register(context.registry())
        .unwrap();
}

#[test]
fn test_after_return_keeps_instance_identity() {
    let context = WeaverContext::new();
    declare_label_aspect(&context);
    context.weaver().enable_aspect(LabelAspect).unwrap();

    let target = annotated_class(&context, "A", &[ACLASS]);
    let woven = context.weaver().enhance_class(&target, labels_constructor()).unwrap();

    let instance = woven.construct(vec![Value::from("ctor")]).unwrap();
    assert_eq!(labels(&instance), ["ctor", "AClass"]);
    assert!(instance.is_instance_of("A"));

    let other = woven.construct(vec![]).unwrap();
    assert!(other.is_instance_of("A"));
    assert_ne!(other.id(), instance.id());
    assert_eq!(labels(&other), ["AClass"]);
}

struct EagerAspect;

#[test]
fn test_instance_is_unavailable_before_constructor() {
    let context = WeaverContext::new();
    AspectBuilder::<EagerAspect>::new("EagerAspect")
        .before(Before::on(on::class().with_annotation(&ACLASS)), "before", |_, ctxt| {
            ctxt.instance()?;
            Ok(Value::Undefined)
        })
        .register(context.registry())
        .unwrap();
    context.weaver().enable_aspect(EagerAspect).unwrap();

    let target = annotated_class(&context, "A", &[ACLASS]);
    let woven = context.weaver().enhance_class(&target, labels_constructor()).unwrap();

    let error = woven.construct(vec![]).unwrap_err();
    assert!(error.is_weaving_error());
    assert_eq!(error.to_string(), CANNOT_GET_THIS_BEFORE_JOINPOINT);
}

struct ReplacingAspect;

#[test]
fn test_around_may_replace_instance() {
    let context = WeaverContext::new();
    AspectBuilder::<ReplacingAspect>::new("ReplacingAspect")
        .around(Around::on(on::class().with_annotation(&ACLASS)), "around", |_, _, _| {
            let replacement = Object::new("A");
            replacement.push("labels", "replaced");
            Ok(Value::Object(replacement))
        })
        .register(context.registry())
        .unwrap();
    context.weaver().enable_aspect(ReplacingAspect).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let constructor = Constructor::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Fields::new())
    });
    let target = annotated_class(&context, "A", &[ACLASS]);
    let woven = context.weaver().enhance_class(&target, constructor).unwrap();

    let instance = woven.construct(vec![]).unwrap();
    assert_eq!(labels(&instance), ["replaced"]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

struct OuterAspect;
struct SkippingAspect;

#[test]
fn test_constructor_cannot_run_after_instance_was_replaced() {
    let context = WeaverContext::new();
    AspectBuilder::<OuterAspect>::new(AspectOptions::id("OuterAspect").with_priority(1))
        .around(Around::on(on::class().with_annotation(&ACLASS)), "around", |_, ctxt, jp| {
            jp.proceed(ctxt)?;
            jp.proceed(ctxt)
        })
        .register(context.registry())
        .unwrap();
    AspectBuilder::<SkippingAspect>::new(AspectOptions::id("SkippingAspect").with_priority(2))
        .around(Around::on(on::class().with_annotation(&ACLASS)), "around", |_, ctxt, jp| {
            if ctxt.data().get("skipped").is_none() {
                ctxt.data().insert("skipped", true);
                return Ok(Value::Object(Object::new("A")));
            }
            jp.proceed(ctxt)
        })
        .register(context.registry())
        .unwrap();
    context
        .weaver()
        .enable([AspectInstance::new(OuterAspect), AspectInstance::new(SkippingAspect)])
        .unwrap();

    let target = annotated_class(&context, "A", &[ACLASS]);
    let woven = context.weaver().enhance_class(&target, Constructor::empty()).unwrap();

    let error = woven.construct(vec![]).unwrap_err();
    assert!(error.is_weaving_error());
    assert_eq!(error.to_string(), CANNOT_CALL_CONSTRUCTOR_AFTER_INSTANCE_USED);
}

// ---------------------------------------------------------------------------
// 返回值约定
// ---------------------------------------------------------------------------

struct ReturningAspect;

#[test]
fn test_after_advice_cannot_return() {
    let context = WeaverContext::new();
    AspectBuilder::<ReturningAspect>::new("ReturningAspect")
        .after(After::on(on::class().with_annotation(&ACLASS)), "after", |_, _| {
            Ok(Value::from("oops"))
        })
        .after(After::on(on::property().with_annotation(&APROPERTY)), "afterGet", |_, _| {
            Ok(Value::from(json!({ "oops": true })))
        })
        .register(context.registry())
        .unwrap();
    context.weaver().enable_aspect(ReturningAspect).unwrap();

    let class = annotated_class(&context, "A", &[ACLASS]);
    let error = context
        .weaver()
        .enhance_class(&class, labels_constructor())
        .unwrap()
        .construct(vec![])
        .unwrap_err();
    assert!(error.is_weaving_error());
    assert!(matches!(error, WeaverError::Advice(_)));
    assert_eq!(
        error.to_string(),
        format!(
            "@After(@test:AClass) ReturningAspect.after(): {}",
            RETURNING_FROM_ADVICE_NOT_SUPPORTED
        )
    );

    let property = context.targets().property("A", "name");
    property.annotate(APROPERTY.annotation());
    let woven = context
        .weaver()
        .enhance_property(&property, PropertyDescriptor::field("name"))
        .unwrap();
    let error = woven.get(&Object::new("A")).unwrap_err();
    assert!(error.to_string().contains("Returning from advice"));
    assert!(error.to_string().contains("@After(@test:AProperty) ReturningAspect.afterGet()"));
}

struct BeforeReturningAspect;

#[test]
fn test_before_advice_cannot_return() {
    let context = WeaverContext::new();
    AspectBuilder::<BeforeReturningAspect>::new("BeforeReturningAspect")
        .before(Before::on(on::method().with_annotation(&AMETHOD)), "before", |_, _| {
            Ok(Value::from(1i64))
        })
        .register(context.registry())
        .unwrap();
    context.weaver().enable_aspect(BeforeReturningAspect).unwrap();

    let target = context.targets().method("A", "run");
    target.annotate(AMETHOD.annotation());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let woven = context
        .weaver()
        .enhance_method(
            &target,
            Method::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Undefined)
            }),
        )
        .unwrap();

    let error = woven.invoke(&Object::new("A"), vec![]).unwrap_err();
    assert!(matches!(error, WeaverError::Advice(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

struct JsonAfterReturnAspect;

#[test]
fn test_class_after_return_must_return_an_instance() {
    let context = WeaverContext::new();
    AspectBuilder::<JsonAfterReturnAspect>::new("JsonAfterReturnAspect")
        .after_return(
            AfterReturn::on(on::class().with_annotation(&ACLASS)),
            "afterReturn",
            |_, _| Ok(Value::from(42i64)),
        )
        .register(context.registry())
        .unwrap();
    context.weaver().enable_aspect(JsonAfterReturnAspect).unwrap();

    let target = annotated_class(&context, "A", &[ACLASS]);
    let error = context
        .weaver()
        .enhance_class(&target, Constructor::empty())
        .unwrap()
        .construct(vec![])
        .unwrap_err();
    assert!(error.to_string().ends_with(RETURNING_NON_INSTANCE_FROM_CLASS_ADVICE));
}

// ---------------------------------------------------------------------------
// 错误处理
// ---------------------------------------------------------------------------

struct RecoverAspect {
    log: Log,
    swallow: bool,
}

fn declare_recover_aspect(context: &WeaverContext) {
    AspectBuilder::<RecoverAspect>::new("RecoverAspect")
        .after_throw(
            AfterThrow::on(on::class().with_annotation(&ACLASS)),
            "afterThrow",
            |aspect, ctxt| {
                aspect.log.lock().push("afterThrow".to_string());
                if !aspect.swallow {
                    return Err(ctxt
                        .error()
                        .cloned()
                        .unwrap_or_else(|| WeaverError::weaving("missing error")));
                }
                let recovered = Object::new("A");
                recovered.push("labels", "recovered");
                Ok(Value::Object(recovered))
            },
        )
        .register(context.registry())
        .unwrap();
}

#[test]
fn test_after_throw_rethrows() {
    let context = WeaverContext::new();
    declare_recover_aspect(&context);
    let log = new_log();
    context
        .weaver()
        .enable_aspect(RecoverAspect {
            log: log.clone(),
            swallow: false,
        })
        .unwrap();

    let thrown = WeaverError::thrown("boom");
    let error_to_throw = thrown.clone();
    let target = annotated_class(&context, "A", &[ACLASS]);
    let woven = context
        .weaver()
        .enhance_class(&target, Constructor::new(move |_| Err(error_to_throw.clone())))
        .unwrap();

    let error = woven.construct(vec![Value::from("ctor")]).unwrap_err();
    assert!(error.same_thrown(&thrown));
    assert!(!error.is_fatal());
    assert_eq!(error.to_string(), "boom");
    assert_eq!(entries(&log), ["afterThrow"]);
}

#[test]
fn test_after_throw_swallows_and_replaces() {
    let context = WeaverContext::new();
    declare_recover_aspect(&context);
    let log = new_log();
    context
        .weaver()
        .enable_aspect(RecoverAspect {
            log: log.clone(),
            swallow: true,
        })
        .unwrap();

    let target = annotated_class(&context, "A", &[ACLASS]);
    let woven = context
        .weaver()
        .enhance_class(&target, Constructor::new(|_| Err(WeaverError::thrown("boom"))))
        .unwrap();

    let instance = woven.construct(vec![Value::from("ctor")]).unwrap();
    assert_eq!(labels(&instance), ["recovered"]);
    assert_eq!(entries(&log), ["afterThrow"]);
}

struct FinallyAspect {
    log: Log,
}

#[test]
fn test_error_passes_through_and_after_still_runs() {
    let context = WeaverContext::new();
    AspectBuilder::<FinallyAspect>::new("FinallyAspect")
        .after(After::on(on::method().with_annotation(&AMETHOD)), "after", |aspect, ctxt| {
            aspect.log.lock().push(format!("after {}", ctxt.target().label()));
            Ok(Value::Undefined)
        })
        .after_return(
            AfterReturn::on(on::method().with_annotation(&AMETHOD)),
            "afterReturn",
            |aspect, _| {
                aspect.log.lock().push("afterReturn".to_string());
                Ok(Value::Undefined)
            },
        )
        .register(context.registry())
        .unwrap();
    let log = new_log();
    context.weaver().enable_aspect(FinallyAspect { log: log.clone() }).unwrap();

    let target = context.targets().method("A", "fail");
    target.annotate(AMETHOD.annotation());
    let thrown = WeaverError::thrown("boom");
    let error_to_throw = thrown.clone();
    let woven = context
        .weaver()
        .enhance_method(&target, Method::new(move |_, _| Err(error_to_throw.clone())))
        .unwrap();

    let error = woven.invoke(&Object::new("A"), vec![]).unwrap_err();
    assert!(error.same_thrown(&thrown));
    assert_eq!(entries(&log), ["after method A.fail"]);
}

struct ViolationFinallyAspect {
    log: Log,
}

#[test]
fn test_after_runs_when_an_advice_breaks_its_contract() {
    let context = WeaverContext::new();
    AspectBuilder::<ViolationFinallyAspect>::new("ViolationFinallyAspect")
        .before(Before::on(on::class().with_annotation(&ACLASS)), "before", |_, _| {
            Ok(Value::from("oops"))
        })
        .after(After::on(on::class().with_annotation(&ACLASS)), "after", |aspect, ctxt| {
            let seen = ctxt.error().map(|e| e.to_string()).unwrap_or_default();
            aspect.log.lock().push(seen);
            Ok(Value::Undefined)
        })
        .register(context.registry())
        .unwrap();
    let log = new_log();
    context
        .weaver()
        .enable_aspect(ViolationFinallyAspect { log: log.clone() })
        .unwrap();

    let target = annotated_class(&context, "A", &[ACLASS]);
    let error = context
        .weaver()
        .enhance_class(&target, labels_constructor())
        .unwrap()
        .construct(vec![])
        .unwrap_err();

    assert!(matches!(error, WeaverError::Advice(_)));
    assert_eq!(
        error.to_string(),
        format!(
            "@Before(@test:AClass) ViolationFinallyAspect.before(): {}",
            RETURNING_FROM_ADVICE_NOT_SUPPORTED
        )
    );
    assert_eq!(entries(&log), [error.to_string()]);
}

struct ErrorObserverAspect {
    seen: Arc<Mutex<Vec<WeaverError>>>,
}

#[test]
fn test_after_sees_error_without_after_throw_advice() {
    let context = WeaverContext::new();
    AspectBuilder::<ErrorObserverAspect>::new("ErrorObserverAspect")
        .after(After::on(on::class().with_annotation(&ACLASS)), "after", |aspect, ctxt| {
            if let Some(error) = ctxt.error() {
                aspect.seen.lock().push(error.clone());
            }
            Ok(Value::Undefined)
        })
        .register(context.registry())
        .unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    context
        .weaver()
        .enable_aspect(ErrorObserverAspect { seen: seen.clone() })
        .unwrap();

    let thrown = WeaverError::thrown("ctor failed");
    let error_to_throw = thrown.clone();
    let target = annotated_class(&context, "A", &[ACLASS]);
    let woven = context
        .weaver()
        .enhance_class(
            &target,
            Constructor::new(move |args| {
                if args.is_empty() {
                    Ok(Fields::new())
                } else {
                    Err(error_to_throw.clone())
                }
            }),
        )
        .unwrap();

    let error = woven.construct(vec![Value::from("fail")]).unwrap_err();
    assert!(error.same_thrown(&thrown));
    {
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].same_thrown(&thrown));
    }

    // 正常构造时 After 通知看不到错误
    woven.construct(vec![]).unwrap();
    assert_eq!(seen.lock().len(), 1);
}

// ---------------------------------------------------------------------------
// 属性
// ---------------------------------------------------------------------------

struct PropertyAspect;

#[test]
fn test_getter_may_replace_value_but_setter_may_not() {
    let context = WeaverContext::new();
    AspectBuilder::<PropertyAspect>::new("PropertyAspect")
        .after_return(
            AfterReturn::on(on::property().with_annotation(&APROPERTY)),
            "getter",
            |_, _| Ok(Value::from("replaced")),
        )
        .after_return(
            AfterReturn::on(on::property().setter().with_annotation(&APROPERTY)),
            "setter",
            |_, _| Ok(Value::from("oops")),
        )
        .register(context.registry())
        .unwrap();
    context.weaver().enable_aspect(PropertyAspect).unwrap();

    let target = context.targets().property("A", "name");
    target.annotate(APROPERTY.annotation());
    let woven = context
        .weaver()
        .enhance_property(&target, PropertyDescriptor::field("name"))
        .unwrap();

    let instance = Object::new("A");
    instance.set("name", "original");
    assert_eq!(woven.get(&instance).unwrap(), Value::from("replaced"));

    let error = woven.set(&instance, "updated").unwrap_err();
    assert!(error.is_weaving_error());
    assert_eq!(
        error.to_string(),
        format!(
            "@AfterReturn(@test:AProperty) PropertyAspect.setter(): {}",
            RETURNING_FROM_ADVICE_NOT_SUPPORTED
        )
    );
    assert_eq!(instance.get("name"), Some(Value::from("updated")));
}

struct GetterAspect {
    log: Log,
}

#[test]
fn test_getter_args_are_cleared_and_around_may_skip_original() {
    let context = WeaverContext::new();
    AspectBuilder::<GetterAspect>::new("GetterAspect")
        .before(Before::on(on::property().with_annotation(&APROPERTY)), "before", |aspect, ctxt| {
            aspect.log.lock().push(format!("args {}", ctxt.args().len()));
            Ok(Value::Undefined)
        })
        .around(Around::on(on::property().with_annotation(&APROPERTY)), "around", |_, _, _| {
            Ok(Value::from(42i64))
        })
        .before(
            Before::on(on::property().setter().with_annotation(&APROPERTY)),
            "beforeSet",
            |aspect, ctxt| {
                aspect.log.lock().push(format!("set {:?}", ctxt.args()));
                Ok(Value::Undefined)
            },
        )
        .register(context.registry())
        .unwrap();
    let log = new_log();
    context.weaver().enable_aspect(GetterAspect { log: log.clone() }).unwrap();

    let reads = Arc::new(AtomicUsize::new(0));
    let counter = reads.clone();
    let descriptor = PropertyDescriptor::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Value::from(1i64))
    })
    .with_setter(|instance, value| {
        instance.set("value", value);
        Ok(())
    });

    let target = context.targets().property("A", "value");
    target.annotate(APROPERTY.annotation());
    let woven = context.weaver().enhance_property(&target, descriptor).unwrap();

    let instance = Object::new("A");
    assert_eq!(woven.get(&instance).unwrap(), Value::from(42i64));
    assert_eq!(reads.load(Ordering::SeqCst), 0);

    woven.set(&instance, 7i64).unwrap();
    assert_eq!(instance.get("value"), Some(Value::from(7i64)));
    assert_eq!(entries(&log), ["args 0", "set [7]"]);
}

// ---------------------------------------------------------------------------
// 方法与参数
// ---------------------------------------------------------------------------

struct MethodAspect;

fn sum() -> Method {
    Method::new(|_, args| Ok(Value::from(args.iter().filter_map(Value::as_i64).sum::<i64>())))
}

#[test]
fn test_method_around_and_after_return_replace_value() {
    let context = WeaverContext::new();
    AspectBuilder::<MethodAspect>::new("MethodAspect")
        .around(Around::on(on::method().with_annotation(&AMETHOD)), "double", |_, ctxt, jp| {
            let doubled = ctxt
                .args()
                .iter()
                .map(|arg| Value::from(arg.as_i64().unwrap_or_default() * 2))
                .collect();
            jp.proceed_with(ctxt, doubled)
        })
        .after_return(
            AfterReturn::on(on::method().with_annotation(&AMETHOD)),
            "increment",
            |_, ctxt| Ok(Value::from(ctxt.value().as_i64().unwrap_or_default() + 1)),
        )
        .register(context.registry())
        .unwrap();
    context.weaver().enable_aspect(MethodAspect).unwrap();

    let target = context.targets().method("Calculator", "sum");
    target.annotate(AMETHOD.annotation());
    let woven = context.weaver().enhance_method(&target, sum()).unwrap();

    let result = woven
        .invoke(&Object::new("Calculator"), vec![Value::from(1i64), Value::from(2i64)])
        .unwrap();
    assert_eq!(result, Value::from(7i64));
}

struct FallbackAspect;

#[test]
fn test_method_after_throw_provides_fallback() {
    let context = WeaverContext::new();
    AspectBuilder::<FallbackAspect>::new("FallbackAspect")
        .after_throw(
            AfterThrow::on(on::method().named("load*").with_annotation(&AMETHOD)),
            "fallback",
            |_, ctxt| {
                let message = ctxt.error().map(|e| e.to_string()).unwrap_or_default();
                Ok(Value::from(format!("fallback: {}", message)))
            },
        )
        .register(context.registry())
        .unwrap();
    context.weaver().enable_aspect(FallbackAspect).unwrap();

    let failing = || Method::new(|_, _| Err(WeaverError::thrown("unavailable")));

    let load = context.targets().method("Repository", "loadUser");
    load.annotate(AMETHOD.annotation());
    let woven = context.weaver().enhance_method(&load, failing()).unwrap();
    assert_eq!(
        woven.invoke(&Object::new("Repository"), vec![]).unwrap(),
        Value::from("fallback: unavailable")
    );

    // 成员名不匹配
    let save = context.targets().method("Repository", "saveUser");
    save.annotate(AMETHOD.annotation());
    let woven = context.weaver().enhance_method(&save, failing()).unwrap();
    assert!(woven.invoke(&Object::new("Repository"), vec![]).is_err());
}

struct ParameterAspect {
    log: Log,
}

#[test]
fn test_parameter_advices_fire_with_owning_method() {
    let context = WeaverContext::new();
    AspectBuilder::<ParameterAspect>::new("ParameterAspect")
        .before(Before::on(on::parameter().with_annotation(&AARG)), "before", |aspect, ctxt| {
            let annotation = ctxt
                .annotation()
                .map(|a| a.reference().name().to_string())
                .unwrap_or_default();
            aspect
                .log
                .lock()
                .push(format!("{} {} {}", ctxt.target().label(), annotation, ctxt.args().len()));
            Ok(Value::Undefined)
        })
        .register(context.registry())
        .unwrap();
    let log = new_log();
    context.weaver().enable_aspect(ParameterAspect { log: log.clone() }).unwrap();

    let method = context.targets().method("A", "run");
    let parameter = context.targets().parameter("A", "run", 1);
    parameter.annotate(AARG.annotation());
    // 第二个被注解的参数不会让通知在一次调用中重复触发
    context
        .targets()
        .parameter("A", "run", 0)
        .annotate(AARG.annotation());

    let first = Method::new(|_, args| Ok(args.first().cloned().unwrap_or_default()));
    let woven = context.weaver().enhance_parameter(&parameter, first).unwrap();
    assert!(Arc::ptr_eq(woven.target(), &method));

    let result = woven
        .invoke(&Object::new("A"), vec![Value::from("x"), Value::from("y")])
        .unwrap();
    assert_eq!(result, Value::from("x"));
    assert_eq!(entries(&log), ["method A.run AArg 2"]);

    woven.invoke(&Object::new("A"), vec![Value::from("z")]).unwrap();
    assert_eq!(entries(&log), ["method A.run AArg 2", "method A.run AArg 1"]);

    // 没有被注解参数的方法不受影响
    let other = context.targets().method("A", "other");
    let woven = context.weaver().enhance_method(&other, sum()).unwrap();
    woven.invoke(&Object::new("A"), vec![]).unwrap();
    assert_eq!(entries(&log).len(), 2);
}

// ---------------------------------------------------------------------------
// 切点表达式
// ---------------------------------------------------------------------------

#[test]
fn test_pointcut_expression_round_trip() {
    let expression = on::property().setter().with_annotation(&APROPERTY);
    assert_eq!(expression.as_str(), "property#set @test:AProperty *");

    let pointcut = Pointcut::of(AdvicePhase::Before, &expression, AdviceOptions::default()).unwrap();
    assert_eq!(pointcut.kind(), JoinPointKind::Property);
    assert_eq!(pointcut.phase(), AdvicePhase::Before);
    assert_eq!(pointcut.annotation(), &APROPERTY);
    assert_eq!(pointcut.name(), "property#set");
    assert!(pointcut.is_setter());

    let error = Pointcut::of(
        AdvicePhase::Before,
        &PointcutExpression::new("property#put @test:AProperty *"),
        AdviceOptions::default(),
    )
    .unwrap_err();
    assert!(error.is_weaving_error());
    assert!(error.to_string().contains(POINTCUT_NOT_RECOGNIZED));
}

// ---------------------------------------------------------------------------
// 加载状态
// ---------------------------------------------------------------------------

#[test]
fn test_cannot_reconfigure_after_load() {
    let context = WeaverContext::new();
    declare_label_aspect(&context);
    context.weaver().enable_aspect(LabelAspect).unwrap();
    assert!(!context.weaver().is_loaded());

    let target = annotated_class(&context, "A", &[ACLASS]);
    context.weaver().enhance_class(&target, labels_constructor()).unwrap();
    assert!(context.weaver().is_loaded());

    let error = context.weaver().enable_aspect(LabelAspect).unwrap_err();
    assert!(error.is_weaving_error());
    assert_eq!(error.to_string(), WEAVER_ALREADY_LOADED);
    assert!(context
        .weaver()
        .disable([AspectInstance::new(LabelAspect)])
        .is_err());

    context.weaver().reset();
    assert!(!context.weaver().is_loaded());
    assert!(context.weaver().profile().is_empty());
    context.weaver().enable_aspect(LabelAspect).unwrap();
}

#[test]
fn test_unlocked_weaver_reweaves_with_new_aspects() {
    let context = WeaverContext::with_config(WeaverConfig::new().lock_after_load(false));
    declare_label_aspect(&context);

    let target = annotated_class(&context, "A", &[ACLASS]);
    let woven = context.weaver().enhance_class(&target, labels_constructor()).unwrap();
    assert_eq!(labels(&woven.construct(vec![]).unwrap()), Vec::<String>::new());

    context.weaver().enable_aspect(LabelAspect).unwrap();
    let Woven::Class(rewoven) = context.weaver().reweave(&target).unwrap() else {
        panic!("expected a woven class");
    };
    assert_eq!(labels(&rewoven.construct(vec![]).unwrap()), ["AClass"]);
}

#[test]
fn test_reweaving_replaces_cached_original() {
    let context = WeaverContext::new();
    declare_label_aspect(&context);
    context.weaver().enable_aspect(LabelAspect).unwrap();

    let target = context.targets().class("A");
    let first = context.weaver().enhance_class(&target, labels_constructor()).unwrap();
    assert_eq!(labels(&first.construct(vec![]).unwrap()), Vec::<String>::new());

    // 注解在第一次织入之后才出现
    target.annotate(ACLASS.annotation());
    let second = context.weaver().enhance_class(&target, labels_constructor()).unwrap();
    assert_eq!(labels(&second.construct(vec![Value::from("ctor")]).unwrap()), ["ctor", "AClass"]);

    let Woven::Class(third) = context.weaver().reweave(&target).unwrap() else {
        panic!("expected a woven class");
    };
    assert_eq!(labels(&third.construct(vec![]).unwrap()), ["AClass"]);
    assert!(context.weaver().original(&target).is_some());
}

// ---------------------------------------------------------------------------
// Compile
// ---------------------------------------------------------------------------

struct CompileAspect {
    calls: Arc<AtomicUsize>,
}

#[test]
fn test_compile_runs_once_per_declaration() {
    let context = WeaverContext::new();
    AspectBuilder::<CompileAspect>::new("CompileAspect")
        .compile(Compile::on(on::class().with_annotation(&ACLASS)), "compile", |aspect, ctxt| {
            aspect.calls.fetch_add(1, Ordering::SeqCst);
            let previous = ctxt
                .compiled()
                .as_constructor()
                .cloned()
                .ok_or_else(|| WeaverError::weaving("expected a constructor"))?;
            Ok(Some(Compiled::from(Constructor::new(move |args| {
                let mut fields = previous.call(args)?;
                fields.insert("compiled".to_string(), Value::from(true));
                Ok(fields)
            }))))
        })
        .register(context.registry())
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    context
        .weaver()
        .enable_aspect(CompileAspect { calls: calls.clone() })
        .unwrap();

    let target = annotated_class(&context, "A", &[ACLASS]);
    let woven = context.weaver().enhance_class(&target, labels_constructor()).unwrap();

    let first = woven.construct(vec![Value::from("ctor")]).unwrap();
    let second = woven.construct(vec![]).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.get("compiled"), Some(Value::from(true)));
    assert_eq!(labels(&first), ["ctor"]);
    assert_eq!(second.get("compiled"), Some(Value::from(true)));
}

struct MismatchedCompileAspect;

#[test]
fn test_compile_must_return_matching_descriptor() {
    let context = WeaverContext::new();
    AspectBuilder::<MismatchedCompileAspect>::new("MismatchedCompileAspect")
        .compile(Compile::on(on::class().with_annotation(&ACLASS)), "compile", |_, _| {
            Ok(Some(Compiled::from(sum())))
        })
        .register(context.registry())
        .unwrap();
    context.weaver().enable_aspect(MismatchedCompileAspect).unwrap();

    let target = annotated_class(&context, "A", &[ACLASS]);
    let error = context
        .weaver()
        .enhance_class(&target, Constructor::empty())
        .unwrap_err();
    assert!(matches!(error, WeaverError::Advice(_)));
    assert!(error.to_string().contains(COMPILE_DESCRIPTOR_MISMATCH));

    // 织入失败不会锁定织入器，也不会缓存原始代码
    assert!(!context.weaver().is_loaded());
    assert!(context.weaver().original(&target).is_none());
    context
        .weaver()
        .disable([AspectInstance::new(MismatchedCompileAspect)])
        .unwrap();
    context
        .weaver()
        .enhance_class(&target, Constructor::empty())
        .unwrap();
    assert!(context.weaver().is_loaded());
    assert!(context.weaver().original(&target).is_some());
}

struct SetterCompileAspect;

#[test]
fn test_compile_on_setter_is_rejected_at_registration() {
    let context = WeaverContext::new();
    let error = AspectBuilder::<SetterCompileAspect>::new("SetterCompileAspect")
        .compile(
            Compile::on(on::property().setter().with_annotation(&APROPERTY)),
            "compile",
            |_, _| Ok(None),
        )
        .register(context.registry())
        .unwrap_err();
    assert!(matches!(error, WeaverError::Advice(_)));
    assert!(error.to_string().contains(COMPILE_ON_SETTER_NOT_SUPPORTED));
}

struct Unregistered;

#[test]
fn test_enabling_a_non_aspect_fails() {
    let context = WeaverContext::new();
    let error = context.weaver().enable_aspect(Unregistered).unwrap_err();
    assert!(matches!(error, WeaverError::Type(_)));
    assert_eq!(error.to_string(), "Unregistered is not an Aspect");
}
