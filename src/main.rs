fn main() {
    if let Err(err) = atmos_widget_lib::run() {
        log::error!("atmos-widget exited: {err:?}");
        std::process::exit(1);
    }
}
