//! `#[aspect]` 宏测试

use chimera_weaver::prelude::*;
use chimera_weaver::{declare_aspect, get_all_aspect_registrations, AdviceRegistry, WeaverConfig};
use chimera_weaver_macros::aspect;
use parking_lot::Mutex;
use std::sync::Arc;

const TRACED: AnnotationRef = AnnotationRef::of("macro", "Traced");

#[derive(Default)]
pub struct TracingAspect {
    log: Mutex<Vec<String>>,
}

#[aspect("TracingAspect", priority = 3)]
impl TracingAspect {
    #[before("method @macro:Traced *")]
    fn enter(&self, ctxt: &AdviceContext) -> WeaverResult<Value> {
        self.record(format!("enter {}", ctxt.target().label()));
        Ok(Value::Undefined)
    }

    #[around(on::method().with_annotation(&TRACED), priority = 1)]
    fn measure(&self, ctxt: &mut AdviceContext, jp: &JoinPoint<'_>) -> WeaverResult<Value> {
        self.record("around".to_string());
        jp.proceed(ctxt)
    }

    #[after_return("method @macro:Traced *")]
    fn leave(&self, ctxt: &AdviceContext) -> WeaverResult<Value> {
        self.record(format!("leave {:?}", ctxt.value()));
        Ok(Value::Undefined)
    }

    fn record(&self, entry: String) {
        self.log.lock().push(entry);
    }
}

pub struct AnonymousAspect;

#[aspect]
impl AnonymousAspect {
    #[after("class @macro:Traced *")]
    #[after_throw("class @macro:Traced *")]
    fn after(&self, _ctxt: &AdviceContext) -> WeaverResult<Value> {
        Ok(Value::Undefined)
    }
}

#[test]
fn test_aspect_is_registered_with_inventory() {
    let names: Vec<&str> = get_all_aspect_registrations().map(|r| r.name).collect();
    assert!(names.contains(&"TracingAspect"));
    assert!(names.contains(&"AnonymousAspect"));
}

#[test]
fn test_aspect_metadata() {
    let registry = AdviceRegistry::new();
    declare_aspect::<TracingAspect>(&registry).unwrap();
    declare_aspect::<AnonymousAspect>(&registry).unwrap();

    let tracing = AspectInstance::new(TracingAspect::default());
    let metadata = registry.metadata(&tracing).unwrap();
    assert_eq!(metadata.id(), Some("TracingAspect"));
    assert_eq!(metadata.priority(), Some(3));

    let advices = registry.get_advices_by_aspect(&tracing).unwrap();
    let tags: Vec<&str> = advices.iter().map(|advice| advice.tag()).collect();
    assert_eq!(
        tags,
        [
            "@Before(@macro:Traced) TracingAspect.enter()",
            "@Around(@macro:Traced) TracingAspect.measure()",
            "@AfterReturn(@macro:Traced) TracingAspect.leave()",
        ]
    );
    assert_eq!(advices[1].pointcut().options().priority, Some(1));

    let anonymous = AspectInstance::new(AnonymousAspect);
    assert!(registry.resolve_id(&anonymous).unwrap().starts_with("AnonymousAspect#"));
    assert_eq!(registry.get_advices_by_aspect(&anonymous).unwrap().len(), 2);
}

#[test]
fn test_macro_aspect_weaves_method() {
    let context = WeaverContext::with_registered_aspects(WeaverConfig::default()).unwrap();
    let aspect = Arc::new(TracingAspect::default());
    context
        .weaver()
        .enable([AspectInstance::from_arc(aspect.clone())])
        .unwrap();

    let target = context.targets().method("Service", "run");
    target.annotate(TRACED.annotation());
    let woven = context
        .weaver()
        .enhance_method(&target, Method::new(|_, _| Ok(Value::from("done"))))
        .unwrap();

    let result = woven.invoke(&Object::new("Service"), vec![]).unwrap();
    assert_eq!(result, Value::from("done"));
    assert_eq!(
        *aspect.log.lock(),
        ["enter method Service.run", "around", "leave \"done\""]
    );
}
