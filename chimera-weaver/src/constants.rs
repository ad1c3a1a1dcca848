//! 织入引擎常量定义
//!
//! 集中定义错误消息文本，调用方（以及测试）会按字面量比对这些消息，
//! 修改时需要同时关注下游的断言

/// 通知在不允许返回值的阶段返回了值
pub const RETURNING_FROM_ADVICE_NOT_SUPPORTED: &str = "Returning from advice is not supported";

/// 类通知返回了非实例值
pub const RETURNING_NON_INSTANCE_FROM_CLASS_ADVICE: &str =
    "Returning a non-instance value from a class advice is not supported";

/// Compile 通知作用于属性 setter
pub const COMPILE_ON_SETTER_NOT_SUPPORTED: &str =
    "Compile advice is not supported on property setters";

/// Compile 通知返回了与连接点类型不符的描述符
pub const COMPILE_DESCRIPTOR_MISMATCH: &str =
    "Compile advice returned a descriptor that does not match the join point";

/// 织入器加载后再修改切面
pub const WEAVER_ALREADY_LOADED: &str = "already loaded: cannot enable or disable aspects";

/// 构造函数连接点执行前访问 this
pub const CANNOT_GET_THIS_BEFORE_JOINPOINT: &str =
    "Cannot get 'this' instance before constructor joinpoint has been called";

/// 实例已被替换后再调用构造函数连接点
pub const CANNOT_CALL_CONSTRUCTOR_AFTER_INSTANCE_USED: &str =
    "Cannot call constructor joinpoint when AroundContext.instance was already used";

/// 无法识别的切点表达式（前缀为表达式文本）
pub const POINTCUT_NOT_RECOGNIZED: &str = "not recognized as valid pointcut expression";

/// 匿名切面 id 的默认前缀
pub const DEFAULT_ANONYMOUS_ASPECT_PREFIX: &str = "AnonymousAspect";
