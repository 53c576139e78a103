//! Macros for compact flow construction.

/// Build a linear flow from `next` edges.
///
/// States are declared in order of first appearance. Expands to a
/// [`FlowBuilder`](crate::builder::FlowBuilder) chain and evaluates to
/// `Result<Engine, BuildError>`.
///
/// # Example
///
/// ```
/// use wizflow::flow;
///
/// let mut engine = flow! {
///     initial: "welcome";
///     final: ["complete"];
///     "welcome" => "license",
///     "license" => "install",
///     "install" => "complete",
/// }
/// .unwrap();
///
/// engine.start().unwrap();
/// assert_eq!(engine.next().unwrap(), "license");
/// ```
#[macro_export]
macro_rules! flow {
    (
        initial: $initial:expr ;
        $( final: [$($final:expr),* $(,)?] ; )?
        $( $from:expr => $to:expr ),+ $(,)?
    ) => {{
        let builder = $crate::builder::FlowBuilder::new()
            $( .edge($from, $to) )+
            .initial($initial);
        $($( let builder = builder.final_state($final); )*)?
        builder.build()
    }};
}
