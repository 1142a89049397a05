fn main() {
    redtime_lib::run()
}
